use std::time::Duration;

use anyhow::Result;
use loader_warehouse::{ConfigError, Warehouse, WarehouseConfig};

use crate::*;

#[tokio::test]
async fn test_warehouse_from_config_file() -> Result<()> {
    let file = config_file(
        r#"
        ttl: 30s
        production_mode: true
        "#,
    );
    let config = WarehouseConfig::get(Some(file.path()))?;

    let warehouse = Warehouse::<TestLoader>::new(config)?;
    assert_eq!(warehouse.ttl(), Duration::from_secs(30));
    assert!(warehouse.is_production());
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_files() {
    for yaml in ["ttl: 0", "ttl: 2147483648", "production_mode: false"] {
        let file = config_file(yaml);
        let config = WarehouseConfig::get(Some(file.path())).unwrap();
        let result = Warehouse::<TestLoader>::new(config);
        assert!(
            matches!(
                result,
                Err(ConfigError::InvalidTtl(_) | ConfigError::MissingTtl)
            ),
            "{yaml}"
        );
    }

    for yaml in ["", "ttl: -1", "ttl: later", "ttl: [1000]"] {
        let file = config_file(yaml);
        assert!(WarehouseConfig::get(Some(file.path())).is_err(), "{yaml}");
    }
}

#[test]
fn test_default_config_has_no_ttl() {
    let config = WarehouseConfig::get(None).unwrap();
    assert_eq!(config.ttl, None);
}
