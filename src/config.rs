use std::env;
use std::fmt::Debug;
use std::str::FromStr;

/// Returns the value of the named environment variable if it exists or panics.
pub fn get_variable(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("must define {} environment variable", name))
}

/// Returns the named environment variable parsed as `T`, or `default` if
/// it is not set. Panics if it is set but cannot be parsed.
pub fn get_variable_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Debug,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("parse {} ({:?}): {:?}", name, value, e)),
        Err(_) => default,
    }
}

/// Returns whether the named variable is set to a truthy value.
pub fn get_flag(name: &str) -> bool {
    matches!(
        env::var(name).as_deref().map(str::trim),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Splits a comma-separated list, dropping blank entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists() {
        assert_eq!(
            split_list(" http://localhost:3000, ,https://petspot.example "),
            vec!["http://localhost:3000", "https://petspot.example"]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(get_variable_or("PETSPOT_TEST_SURELY_UNSET", 7u32), 7);
        assert!(!get_flag("PETSPOT_TEST_SURELY_UNSET"));
    }
}
