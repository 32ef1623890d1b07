use super::*;
use crate::indexer::CodeChunk;

fn search(query: &str, limit: Option<usize>, min_score: Option<f32>) -> SearchChunksRequest {
    SearchChunksRequest {
        project: "webapp".to_string(),
        query: query.to_string(),
        limit,
        min_score,
    }
}

#[test]
fn test_search_request_validation() {
    assert!(search("parse config", None, None).validate().is_ok());
    assert!(search("parse config", Some(1000), Some(1.0)).validate().is_ok());

    assert_eq!(search("  ", None, None).validate().unwrap_err(), "Empty query");
    assert!(
        search("q", Some(0), None)
            .validate()
            .unwrap_err()
            .contains("limit must be between 1 and 1000")
    );
    assert!(search("q", Some(1001), None).validate().is_err());
    assert!(
        search("q", None, Some(1.5))
            .validate()
            .unwrap_err()
            .contains("min_score")
    );
    assert!(search("q", None, Some(-0.1)).validate().is_err());
}

#[test]
fn test_keyword_and_dependency_validation() {
    let keyword = KeywordSearchRequest {
        project: "webapp".to_string(),
        keyword: String::new(),
        limit: None,
    };
    assert_eq!(keyword.validate().unwrap_err(), "Empty keyword");

    let deps = ChunkDependenciesRequest {
        project: "".to_string(),
        name: "render".to_string(),
    };
    assert_eq!(deps.validate().unwrap_err(), "Empty project");
}

#[test]
fn test_create_request_description_optional() {
    let req: CreateProjectRequest =
        serde_json::from_str(r#"{"name": "webapp", "path": "/srv/webapp"}"#).unwrap();
    assert!(req.description.is_none());
    assert!(req.validate().is_ok());

    let blank = CreateProjectRequest {
        name: " ".to_string(),
        path: "/srv".to_string(),
        description: None,
    };
    assert!(blank.validate().is_err());
}

#[test]
fn test_analyze_request_defaults() {
    let req: AnalyzeProjectRequest = serde_json::from_str(r#"{"project": "webapp"}"#).unwrap();
    assert!(!req.force_full);
    assert!(req.validate().is_ok());
}

#[test]
fn test_analysis_mode_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&AnalysisMode::Incremental).unwrap(),
        "\"incremental\""
    );
    assert_eq!(
        serde_json::from_str::<AnalysisMode>("\"skipped\"").unwrap(),
        AnalysisMode::Skipped
    );
}

#[test]
fn test_chunk_result_drops_embedding() {
    let mut chunk = CodeChunk::new(
        "p",
        "src/a.ts",
        "render",
        ChunkType::Function,
        "function render() {\n  draw();\n}",
        4,
        6,
    );
    chunk.embedding = Some(vec![0.5; 4]);
    chunk.dependencies = vec!["draw".to_string()];

    let result = ChunkResult::from(ScoredChunk {
        chunk: chunk.clone(),
        score: 0.75,
    });
    assert_eq!(result.id, chunk.id);
    assert_eq!(result.dependencies, vec!["draw"]);
    assert_eq!((result.line_start, result.line_end), (4, 6));

    let json = serde_json::to_value(&result).unwrap();
    assert!(json.get("embedding").is_none());
    assert_eq!(json["chunk_type"], "function");
}

#[test]
fn test_project_info_from_project() {
    let project = Project {
        id: "id-1".to_string(),
        name: "webapp".to_string(),
        path: std::path::PathBuf::from("/srv/webapp"),
        description: None,
        last_commit_hash: Some("abc123".to_string()),
        created_at: 1_700_000_000,
    };
    let info = ProjectInfo::from(&project);
    assert_eq!(info.path, "/srv/webapp");
    assert_eq!(info.last_commit_hash.as_deref(), Some("abc123"));
}

#[test]
fn test_schemas_generate() {
    for schema in [
        serde_json::to_value(schemars::schema_for!(CreateProjectRequest)).unwrap(),
        serde_json::to_value(schemars::schema_for!(SearchChunksRequest)).unwrap(),
        serde_json::to_value(schemars::schema_for!(AnalyzeResponse)).unwrap(),
    ] {
        assert!(schema.get("properties").is_some());
    }
}
