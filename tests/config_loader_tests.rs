use shipit_admin::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        env::remove_var("SHIPIT_PROFILE");
        env::remove_var("SHIPIT_API_URL");
        env::remove_var("SHIPIT_PUBLIC_API_URL");
        env::remove_var("SHIPIT_LOG_LEVEL");
        env::remove_var("SHIPIT_POLL_INTERVAL_SECONDS");
        env::remove_var("SHIPIT_ACCESS_TOKEN");
        env::remove_var("SHIPIT_PRODUCTS_FILE");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_url, "http://localhost:8015");
    assert_eq!(cfg.public_api_url, cfg.api_url);
    assert_eq!(cfg.poll_interval_seconds, 30);
    assert!(cfg.access_token.is_none());
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "SHIPIT_API_URL=http://localhost:1000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "SHIPIT_API_URL=http://localhost:2000\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "SHIPIT_API_URL=http://localhost:3000/\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "SHIPIT_PROFILE=test\nSHIPIT_API_URL=http://localhost:4000\nSHIPIT_ACCESS_TOKEN=layered-token\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_url, "http://localhost:3000");
    assert_eq!(cfg.access_token.as_deref(), Some("layered-token"));
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "SHIPIT_API_URL=http://localhost:1000\nSHIPIT_POLL_INTERVAL_SECONDS=60\n",
    );

    unsafe {
        env::set_var("SHIPIT_API_URL", "http://localhost:9090");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_url, "http://localhost:9090");
    assert_eq!(cfg.poll_interval_seconds, 60);

    clear_env();
}

#[test]
fn production_profile_rejects_plain_http() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("SHIPIT_PROFILE", "production");
    }
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("plain http api url should fail");
    assert!(matches!(err, ConfigError::InsecureApiUrl { .. }));
    assert!(format!("{}", err).contains("must use https"));

    clear_env();
}

#[test]
fn relative_products_file_resolves_against_base_dir() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        "products.json",
        r#"{"products": [{
            "product": "pinebuild", "pretty_name": "Pine", "app_name": "browser",
            "branches": [{"pretty_name": "Pine", "project": "pine", "branch": "projects/pine",
                          "repo": "https://hg.mozilla.org/projects/pine"}]
        }]}"#,
    );
    write_env_file(&temp_dir, ".env", "SHIPIT_PRODUCTS_FILE=products.json\n");

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads");
    assert_eq!(
        cfg.products_file.as_deref(),
        Some(temp_dir.path().join("products.json").as_path())
    );

    let catalog = cfg.product_catalog().expect("catalog loads");
    assert_eq!(
        catalog.product_branches(),
        vec![("pinebuild".to_string(), "projects/pine".to_string())]
    );

    clear_env();
}
