//! 配置分层加载测试
//!
//! 在临时目录写入 TOML 文件，验证文件与环境变量的覆盖顺序。

use std::fs;
use std::path::PathBuf;

use greenloop_shared::config::AppConfig;

fn temp_config_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("greenloop-config-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_files_and_env_layering() {
    let dir = temp_config_dir();
    fs::write(
        dir.join("default.toml"),
        r#"
[server]
port = 9100

[uploads]
dir = "/tmp/greenloop-uploads"

[admin]
emails = ["root@greenloop.com"]
"#,
    )
    .unwrap();
    fs::write(
        dir.join("staging.toml"),
        r#"
[server]
port = 9200
"#,
    )
    .unwrap();

    // SAFETY: 本文件只有这一个测试修改环境变量
    unsafe {
        std::env::set_var("CONFIG_DIR", &dir);
        std::env::set_var("APP_ENV", "staging");
        std::env::set_var("GREENLOOP_AUTH__ISSUER", "greenloop-test");
        std::env::set_var("GREENLOOP_CORS__ALLOWED_ORIGINS", "http://a.test,http://b.test");
    }

    let config = AppConfig::load("greenloop-api").unwrap();

    unsafe {
        std::env::remove_var("CONFIG_DIR");
        std::env::remove_var("APP_ENV");
        std::env::remove_var("GREENLOOP_AUTH__ISSUER");
        std::env::remove_var("GREENLOOP_CORS__ALLOWED_ORIGINS");
    }
    let _ = fs::remove_dir_all(&dir);

    assert_eq!(config.environment, "staging");
    assert_eq!(config.uploads.dir, "/tmp/greenloop-uploads");
    assert_eq!(config.auth.issuer, "greenloop-test");
    assert_eq!(
        config.cors.allowed_origins,
        vec!["http://a.test".to_string(), "http://b.test".to_string()]
    );
    assert!(config.admin.is_admin_email("root@greenloop.com"));
    if std::env::var("PORT").is_err() {
        assert_eq!(config.server.port, 9200);
    }
}
