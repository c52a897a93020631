//! `options_contract` 集成测试：`HandleOptions` 可以从宿主的 TOML 配置中反序列化。

use std::sync::Arc;

use spark_oob_buffer::{AccessPolicy, BufferHandle, ByteArray, ContiguityOrder, HandleOptions};

/// 缺省字段回退为默认策略。
#[test]
fn empty_table_yields_defaults() {
    let options: HandleOptions = toml::from_str("").expect("空表应可解析");
    assert_eq!(options, HandleOptions::default());
    assert_eq!(options.access, AccessPolicy::PreferWritable);
    assert_eq!(options.require_contiguous, None);
}

/// snake_case 枚举值映射到访问策略与连续性顺序。
#[test]
fn snake_case_values_select_policy_and_order() {
    let options: HandleOptions = toml::from_str(
        r#"
        access = "read_only"
        require_contiguous = "any"
        "#,
    )
    .expect("合法配置");
    assert_eq!(
        options,
        HandleOptions::new()
            .with_access(AccessPolicy::ReadOnly)
            .with_require_contiguous(ContiguityOrder::Any)
    );

    let strict: HandleOptions =
        toml::from_str(r#"access = "require_writable""#).expect("合法配置");
    assert_eq!(strict.access, AccessPolicy::RequireWritable);
}

/// 未知取值被拒绝，而不是静默回退。
#[test]
fn unknown_policy_is_rejected() {
    assert!(toml::from_str::<HandleOptions>(r#"access = "exclusive""#).is_err());
}

/// 解析出的选项直接驱动句柄构造。
#[test]
fn parsed_options_drive_handle_construction() {
    let options: HandleOptions = toml::from_str(r#"access = "read_only""#).expect("合法配置");
    let array = Arc::new(ByteArray::new(b"payload".to_vec()));
    let handle = BufferHandle::with_options(Arc::clone(&array), &options).expect("只读句柄");
    assert!(!handle.view().expect("存活").is_writable());
    assert_eq!(array.exports().readers, 1);
}
