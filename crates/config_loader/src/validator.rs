//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (validator derive): dispatch_latency_ms 在 [1, 500]，
//!   阈值 >= 1，rate_hz > 0，signals 非空
//! - producer id 唯一
//! - consumer name 唯一

use std::collections::HashSet;

use contracts::{ContractError, RouterBlueprint};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 校验 RouterBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &RouterBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_producer_ids(blueprint)?;
    validate_consumer_names(blueprint)?;
    Ok(())
}

/// 字段级校验 (derive 规则)
fn validate_fields(blueprint: &RouterBlueprint) -> Result<(), ContractError> {
    blueprint.validate().map_err(|errors| {
        let (field, message) = first_error(&errors, String::new())
            .unwrap_or_else(|| ("blueprint".to_string(), errors.to_string()));
        ContractError::config_validation(field, message)
    })
}

/// 找到第一个字段错误，返回 (路径, 描述)
///
/// 按字段名排序，保证错误信息稳定。
fn first_error(errors: &ValidationErrors, prefix: String) -> Option<(String, String)> {
    let mut entries: Vec<_> = errors.errors().iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in entries {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        let found = match kind {
            ValidationErrorsKind::Field(list) => list.first().map(|e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("failed `{}` check", e.code));
                (path, message)
            }),
            ValidationErrorsKind::Struct(inner) => first_error(inner, path),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(index, inner)| first_error(inner, format!("{path}[{index}]"))),
        };

        if found.is_some() {
            return found;
        }
    }
    None
}

/// 校验 producer id 唯一性
fn validate_producer_ids(blueprint: &RouterBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for producer in &blueprint.producers {
        if !seen.insert(&producer.id) {
            return Err(ContractError::config_validation(
                format!("producers[id={}]", producer.id),
                "duplicate producer id",
            ));
        }
    }
    Ok(())
}

/// 校验 consumer name 唯一性
fn validate_consumer_names(blueprint: &RouterBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for consumer in &blueprint.consumers {
        if !seen.insert(&consumer.name) {
            return Err(ContractError::config_validation(
                format!("consumers[name={}]", consumer.name),
                "duplicate consumer name",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ConsumerConfig, ProducerConfig, RouterSettings, SinkType};
    use std::collections::HashMap;

    fn minimal_blueprint() -> RouterBlueprint {
        RouterBlueprint {
            producers: vec![ProducerConfig {
                id: "pmu".to_string(),
                signals: vec!["A".into()],
                rate_hz: 10.0,
                batch_size: 1,
            }],
            consumers: vec![ConsumerConfig {
                name: "console".to_string(),
                sink_type: SinkType::Log,
                signals: None,
                params: HashMap::new(),
            }],
            ..Default::default()
        }
    }

    fn field_of(err: ContractError) -> String {
        match err {
            ContractError::ConfigValidation { field, .. } => field,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_blueprint()).is_ok());
    }

    #[test]
    fn test_latency_out_of_range() {
        let mut bp = minimal_blueprint();
        bp.router = RouterSettings::with_latency(501);
        let err = validate(&bp).unwrap_err();
        assert_eq!(field_of(err), "router.dispatch_latency_ms");
    }

    #[test]
    fn test_zero_flush_threshold() {
        let mut bp = minimal_blueprint();
        bp.router.flush_threshold = 0;
        let err = validate(&bp).unwrap_err();
        assert_eq!(field_of(err), "router.flush_threshold");
    }

    #[test]
    fn test_invalid_rate() {
        let mut bp = minimal_blueprint();
        bp.producers[0].rate_hz = 0.0;
        let err = validate(&bp).unwrap_err();
        assert_eq!(field_of(err), "producers[0].rate_hz");
    }

    #[test]
    fn test_empty_producer_signals() {
        let mut bp = minimal_blueprint();
        bp.producers[0].signals.clear();
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_duplicate_producer_id() {
        let mut bp = minimal_blueprint();
        bp.producers.push(bp.producers[0].clone());
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("duplicate producer id"));
    }

    #[test]
    fn test_duplicate_consumer_name() {
        let mut bp = minimal_blueprint();
        bp.consumers.push(bp.consumers[0].clone());
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("duplicate consumer name"));
    }

    #[test]
    fn test_empty_consumer_name() {
        let mut bp = minimal_blueprint();
        bp.consumers[0].name.clear();
        let err = validate(&bp).unwrap_err();
        assert_eq!(field_of(err), "consumers[0].name");
    }
}
