//! Header heuristics for locating semantic columns.
//!
//! Assessment workbooks are exported by hand and their headers drift
//! (accents, prefixes, casing), so columns are matched by substring on the
//! lowercased header. The first matching column wins.

fn find(columns: &[String], pred: impl Fn(&str, &str) -> bool) -> Option<usize> {
    columns.iter().position(|c| {
        let lower = c.trim().to_lowercase();
        pred(c, &lower)
    })
}

pub fn competence(columns: &[String]) -> Option<usize> {
    find(columns, |_, l| l.contains("competencia"))
}

pub fn learning_goal(columns: &[String]) -> Option<usize> {
    find(columns, |_, l| l.contains("meta de aprendizaje"))
}

pub fn learning_objective(columns: &[String]) -> Option<usize> {
    find(columns, |_, l| l.contains("objetivo de aprendizaje"))
}

/// Term in which the assessment was applied.
pub fn period(columns: &[String]) -> Option<usize> {
    find(columns, |_, l| {
        l.starts_with("semestre") || l.contains("semestre o ciclo") || l.starts_with("periodo")
    })
}

/// Entry cohort of the student.
pub fn cohort(columns: &[String]) -> Option<usize> {
    find(columns, |c, l| {
        c.trim().to_uppercase() == "PERIODO" || l.contains("cohorte")
    })
}

/// Cohort when available, otherwise the application period.
pub fn cohort_or_period(columns: &[String]) -> Option<usize> {
    find(columns, |c, l| {
        let upper = c.trim().to_uppercase();
        upper == "PERIODO" || upper == "COHORTE" || l.contains("cohorte") || l.starts_with("periodo")
    })
    .or_else(|| period(columns))
}

pub fn score(columns: &[String]) -> Option<usize> {
    find(columns, |_, l| l.contains("puntaje criterio"))
}

/// Prefers the "código y nombre del criterio" column; any other criterion
/// column is accepted as long as it is not the score.
pub fn criterion(columns: &[String]) -> Option<usize> {
    find(columns, |_, l| {
        l.contains("código y nombre del criterio")
            || l.contains("codigo y nombre del criterio")
            || l.contains("nombre del criterio")
    })
    .or_else(|| {
        let score = score(columns);
        columns
            .iter()
            .enumerate()
            .find(|(i, c)| Some(*i) != score && c.to_lowercase().contains("criterio"))
            .map(|(i, _)| i)
    })
}

pub fn average(columns: &[String]) -> Option<usize> {
    find(columns, |c, l| {
        c.trim().to_uppercase() == "PROMEDIO" || l.contains("promedio escritura")
    })
}

pub fn student(columns: &[String]) -> Option<usize> {
    find(columns, |_, l| l.contains("código del estudiante") || l == "codigo")
}

pub fn program(columns: &[String]) -> Option<usize> {
    find(columns, |_, l| l == "programa")
}
