//! Environment variable lists as ordered maps
//!
//! A name appears at most once. Re-inserting a name overwrites its value in
//! place; new names are appended, so the order of first-seen names is stable.

use k8s_openapi::api::core::v1::EnvVar;

/// Build a plain `name=value` variable
pub fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

/// Insert or overwrite each of `new` in `existing`
pub fn upsert_env<I>(existing: &mut Vec<EnvVar>, new: I)
where
    I: IntoIterator<Item = EnvVar>,
{
    for var in new {
        match existing.iter_mut().find(|e| e.name == var.name) {
            Some(slot) => *slot = var,
            None => existing.push(var),
        }
    }
}

/// Remove the first variable called `name`; returns whether one was removed
pub fn remove_env(existing: &mut Vec<EnvVar>, name: &str) -> bool {
    match existing.iter().position(|e| e.name == name) {
        Some(index) => {
            existing.remove(index);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(vars: &[EnvVar]) -> Vec<&str> {
        vars.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut vars = vec![env_var("A", "1"), env_var("B", "2"), env_var("C", "3")];
        upsert_env(&mut vars, [env_var("B", "20")]);

        assert_eq!(names(&vars), ["A", "B", "C"]);
        assert_eq!(vars[1].value.as_deref(), Some("20"));
    }

    #[test]
    fn test_new_name_appends() {
        let mut vars = vec![env_var("A", "1")];
        upsert_env(&mut vars, [env_var("Z", "26"), env_var("A", "10")]);

        assert_eq!(names(&vars), ["A", "Z"]);
        assert_eq!(vars[0].value.as_deref(), Some("10"));
    }

    #[test]
    fn test_remove_first_only() {
        let mut vars = vec![env_var("A", "1"), env_var("B", "2")];
        assert!(remove_env(&mut vars, "A"));
        assert!(!remove_env(&mut vars, "A"));
        assert_eq!(names(&vars), ["B"]);
    }
}
