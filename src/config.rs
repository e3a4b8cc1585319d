use std::collections::HashMap;

pub const DEFAULT_PRAGMA: &str = "m";
pub const DEFAULT_CLASS_KEY: &str = "className";
pub const DEFAULT_EVAL_BUDGET: u64 = 100_000;

// -----------------------------------------------------------------------------
// Plugin options
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum splice passes per speculative attempt (at least 1).
    pub repeat_limit: u64,
    /// Treat `Object.assign({...}, ...)` attrs as never producing a component.
    pub assign_never_component: bool,
    pub pragma: String,
    pub class_key: String,
    /// Step budget for the evaluator, stands in for a wall-clock timeout.
    pub eval_budget: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repeat_limit: 1,
            assign_never_component: false,
            pragma: DEFAULT_PRAGMA.to_string(),
            class_key: DEFAULT_CLASS_KEY.to_string(),
            eval_budget: DEFAULT_EVAL_BUDGET,
        }
    }
}

impl Config {
    pub fn from_map(mut config: HashMap<String, serde_json::Value>) -> Self {
        let defaults = Config::default();

        let repeat_limit = config
            .remove("repeatLimit")
            .and_then(|v| v.as_u64())
            .unwrap_or(defaults.repeat_limit)
            .max(1);
        let assign_never_component = config
            .remove("assignNeverComponent")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.assign_never_component);
        let pragma = config
            .remove("pragma")
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.pragma);
        let class_key = config
            .remove("classKey")
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.class_key);
        let eval_budget = config
            .remove("evalBudget")
            .and_then(|v| v.as_u64())
            .unwrap_or(defaults.eval_budget)
            .max(1);

        if !config.is_empty() {
            log::debug!(
                "ignoring unknown options: {:?}",
                config.keys().collect::<Vec<_>>()
            );
        }

        Self {
            repeat_limit,
            assign_never_component,
            pragma,
            class_key,
            eval_budget,
        }
    }

    /// Unparseable JSON yields the defaults, same as the plugin host does.
    pub fn from_json(json: &str) -> Self {
        Self::from_map(serde_json::from_str(json).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        assert_eq!(Config::from_map(HashMap::new()), Config::default());
        assert_eq!(Config::from_json("not json"), Config::default());
    }

    #[test]
    fn reads_known_keys() {
        let config = Config::from_json(
            r#"{"repeatLimit": 3, "assignNeverComponent": true, "pragma": "h", "classKey": "class"}"#,
        );
        assert_eq!(config.repeat_limit, 3);
        assert!(config.assign_never_component);
        assert_eq!(config.pragma, "h");
        assert_eq!(config.class_key, "class");
        assert_eq!(config.eval_budget, DEFAULT_EVAL_BUDGET);
    }

    #[test]
    fn repeat_limit_is_at_least_one() {
        assert_eq!(Config::from_json(r#"{"repeatLimit": 0}"#).repeat_limit, 1);
    }

    #[test]
    fn wrong_types_fall_back() {
        let config = Config::from_json(r#"{"repeatLimit": "2", "assignNeverComponent": 1}"#);
        assert_eq!(config.repeat_limit, 1);
        assert!(!config.assign_never_component);
    }
}
