use thiserror::Error;

/// Errors raised while interpreting the session configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The communication strategy tag is neither `scatter` nor `all_to_all`.
    #[error("unknown communication strategy `{0}`: specify scatter or all_to_all")]
    UnknownStrategy(String),

    /// The plan hint is not one of the supported planner settings.
    #[error("unknown plan hint `{0}`: specify estimate, measure, patient or exhaustive")]
    UnknownPlanHint(String),

    /// The input generator is not one of the supported workloads.
    #[error("unknown input `{0}`: specify ramp or random")]
    UnknownInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_tag() {
        let err = ConfigError::UnknownStrategy("broadcast".into());
        assert_eq!(
            err.to_string(),
            "unknown communication strategy `broadcast`: specify scatter or all_to_all"
        );

        let err = ConfigError::UnknownPlanHint("fast".into());
        assert!(err.to_string().contains("`fast`"));
    }
}
