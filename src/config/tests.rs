use super::*;
use tempfile::NamedTempFile;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.store.backend, "lancedb");
    assert_eq!(config.store.table_name, "code_chunks");
    assert_eq!(config.embedding.model_name, "all-MiniLM-L6-v2");
    assert_eq!(config.embedding.batch_size, 300);
    assert_eq!(config.indexing.dependency_strategy, DependencyStrategy::Structural);
    assert!(!config.indexing.resolve_against_store);
    assert!(config.indexing.prune_stale_chunks);
    assert!(config.indexing.ignored_dirs.contains(&"node_modules".to_string()));
    assert!(config.indexing.extensions.contains(&"tsx".to_string()));
    assert_eq!(config.search.limit, 10);
}

#[test]
fn test_validate_valid_config() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn test_validate_invalid_backend() {
    let mut config = Config::default();
    config.store.backend = "qdrant".to_string();
    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        ChunkGraphError::Config(ConfigError::InvalidValue { ref key, .. }) if key == "store.backend"
    ));
}

#[test]
fn test_validate_invalid_batch_size() {
    let mut config = Config::default();
    config.embedding.batch_size = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_zero_retries() {
    let mut config = Config::default();
    config.embedding.max_retries = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_unknown_extension() {
    let mut config = Config::default();
    config.indexing.extensions.push("py".to_string());
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("'py'"));
}

#[test]
fn test_validate_invalid_min_score() {
    let mut config = Config::default();
    config.search.min_score = 1.5;
    assert!(config.validate().is_err());
}

#[test]
fn test_save_and_load() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path();

    let mut config = Config::default();
    config.embedding.batch_size = 64;
    config.indexing.dependency_strategy = DependencyStrategy::Lexical;
    config.indexing.resolve_against_store = true;

    config.save(path).unwrap();
    let loaded = Config::from_file(path).unwrap();

    assert_eq!(loaded.embedding.batch_size, 64);
    assert_eq!(loaded.indexing.dependency_strategy, DependencyStrategy::Lexical);
    assert!(loaded.indexing.resolve_against_store);
}

#[test]
fn test_partial_file_uses_defaults() {
    let temp_file = NamedTempFile::new().unwrap();
    std::fs::write(
        temp_file.path(),
        "[store]\nbackend = \"memory\"\n\n[search]\nlimit = 25\n",
    )
    .unwrap();

    let loaded = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(loaded.store.backend, "memory");
    assert_eq!(loaded.search.limit, 25);
    assert_eq!(loaded.embedding.batch_size, 300);
    assert_eq!(loaded.store.table_name, "code_chunks");
}

#[test]
fn test_load_nonexistent_file() {
    let result = Config::from_file(Path::new("/nonexistent/chunkgraph.toml"));
    assert!(matches!(
        result.unwrap_err(),
        ChunkGraphError::Config(ConfigError::FileNotFound(_))
    ));
}

#[test]
fn test_load_invalid_toml() {
    let temp_file = NamedTempFile::new().unwrap();
    std::fs::write(temp_file.path(), "[store\nbackend = ").unwrap();
    assert!(matches!(
        Config::from_file(temp_file.path()).unwrap_err(),
        ChunkGraphError::Config(ConfigError::ParseFailed(_))
    ));
}

#[test]
fn test_retry_policy_from_embedding_config() {
    let mut config = Config::default();
    config.embedding.max_retries = 5;
    config.embedding.retry_base_delay_ms = 10;
    let policy = config.embedding.retry_policy();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.base_delay, std::time::Duration::from_millis(10));
}

#[test]
fn test_apply_env_overrides() {
    // Safety: the variables are unique to this test and removed before it returns
    unsafe {
        std::env::set_var("CHUNKGRAPH_DB_BACKEND", "memory");
        std::env::set_var("CHUNKGRAPH_BATCH_SIZE", "42");
        std::env::set_var("CHUNKGRAPH_DEPENDENCY_STRATEGY", "lexical");
        std::env::set_var("CHUNKGRAPH_REGISTRY_PATH", "/tmp/chunkgraph-projects.json");
    }

    let mut config = Config::default();
    config.apply_env_overrides();

    unsafe {
        std::env::remove_var("CHUNKGRAPH_DB_BACKEND");
        std::env::remove_var("CHUNKGRAPH_BATCH_SIZE");
        std::env::remove_var("CHUNKGRAPH_DEPENDENCY_STRATEGY");
        std::env::remove_var("CHUNKGRAPH_REGISTRY_PATH");
    }

    assert_eq!(config.store.backend, "memory");
    assert_eq!(config.embedding.batch_size, 42);
    assert_eq!(config.indexing.dependency_strategy, DependencyStrategy::Lexical);
    assert_eq!(
        config.registry.path,
        PathBuf::from("/tmp/chunkgraph-projects.json")
    );
}
