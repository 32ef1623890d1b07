use super::*;
use crate::store::MemoryChunkStore;
use crate::test_support::{HistogramEmbedder, StubVcs};
use tempfile::TempDir;

struct Fixture {
    client: ChunkGraphClient,
    project_dir: TempDir,
    _state_dir: TempDir,
}

async fn fixture(working_copy: bool, revision: Option<&str>) -> Fixture {
    let state_dir = TempDir::new().unwrap();
    let project_dir = TempDir::new().unwrap();
    let vcs = StubVcs::new(working_copy, revision);
    let client = ChunkGraphClient::with_components(
        Config::default(),
        Arc::new(HistogramEmbedder),
        Arc::new(MemoryChunkStore::new()),
        Arc::new(vcs),
        state_dir.path().join("projects.json"),
    )
    .await
    .unwrap();
    Fixture {
        client,
        project_dir,
        _state_dir: state_dir,
    }
}

fn write(dir: &TempDir, relative: &str, content: &str) {
    let path = dir.path().join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn create_request(name: &str, dir: &TempDir) -> CreateProjectRequest {
    CreateProjectRequest {
        name: name.to_string(),
        path: dir.path().to_string_lossy().to_string(),
        description: None,
    }
}

fn analyze_request(project: &str) -> AnalyzeProjectRequest {
    AnalyzeProjectRequest {
        project: project.to_string(),
        force_full: false,
    }
}

const UTIL_TS: &str = "export function add(a: number, b: number) {\n  return a + b;\n}\n";
const MAIN_TS: &str = "import { add } from './util';\n\nexport function run() {\n  return add(1, 2);\n}\n";

#[tokio::test]
async fn test_create_project_validates_path() {
    let f = fixture(true, None).await;

    let err = f
        .client
        .create_project(CreateProjectRequest {
            name: "missing".to_string(),
            path: "/definitely/not/here".to_string(),
            description: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ValidationError>(),
        Some(ValidationError::PathNotFound(_))
    ));

    write(&f.project_dir, "file.ts", "x");
    let err = f
        .client
        .create_project(CreateProjectRequest {
            name: "file".to_string(),
            path: f.project_dir.path().join("file.ts").to_string_lossy().to_string(),
            description: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ValidationError>(),
        Some(ValidationError::NotADirectory(_))
    ));
}

#[tokio::test]
async fn test_create_project_requires_working_copy() {
    let f = fixture(false, None).await;
    let err = f
        .client
        .create_project(create_request("webapp", &f.project_dir))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ValidationError>(),
        Some(ValidationError::NotAWorkingCopy(_))
    ));
    assert!(f.client.list_projects().await.unwrap().projects.is_empty());
}

#[tokio::test]
async fn test_create_list_and_persist_registry() {
    let f = fixture(true, None).await;
    let info = f
        .client
        .create_project(create_request("webapp", &f.project_dir))
        .await
        .unwrap();

    let canonical = std::fs::canonicalize(f.project_dir.path()).unwrap();
    assert_eq!(info.path, canonical.display().to_string());

    let listed = f.client.list_projects().await.unwrap();
    assert_eq!(listed.projects.len(), 1);
    assert_eq!(listed.projects[0].id, info.id);

    let reloaded = ProjectRegistry::load(&f.client.registry_path).unwrap();
    assert_eq!(reloaded.list().len(), 1);

    let err = f
        .client
        .create_project(create_request("other", &f.project_dir))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ValidationError>(),
        Some(ValidationError::DuplicateProject(_))
    ));
}

#[tokio::test]
async fn test_analyze_without_revision_runs_full_each_time() {
    let f = fixture(true, None).await;
    write(&f.project_dir, "util.ts", UTIL_TS);
    write(&f.project_dir, "main.ts", MAIN_TS);
    f.client
        .create_project(create_request("webapp", &f.project_dir))
        .await
        .unwrap();

    let first = f.client.analyze_project(analyze_request("webapp")).await.unwrap();
    assert_eq!(first.mode, AnalysisMode::Full);
    assert_eq!(first.files_processed, 2);
    assert_eq!(first.chunks_indexed, 2);
    assert_eq!(first.embeddings_generated, 2);
    assert_eq!(first.dependency_edges, 1);
    assert_eq!(first.transitive_dependencies, 1);
    assert_eq!(first.revision, None);

    let second = f.client.analyze_project(analyze_request("webapp")).await.unwrap();
    assert_eq!(second.mode, AnalysisMode::Full);
    assert_eq!(second.total_chunks, 2);
}

#[tokio::test]
async fn test_unchanged_revision_skips() {
    let f = fixture(true, Some("r1")).await;
    write(&f.project_dir, "util.ts", UTIL_TS);
    f.client
        .create_project(create_request("webapp", &f.project_dir))
        .await
        .unwrap();

    let first = f.client.analyze_project(analyze_request("webapp")).await.unwrap();
    assert_eq!(first.mode, AnalysisMode::Full);
    assert_eq!(first.revision.as_deref(), Some("r1"));

    let second = f.client.analyze_project(analyze_request("webapp")).await.unwrap();
    assert_eq!(second.mode, AnalysisMode::Skipped);
    assert_eq!(second.total_chunks, 1);
    assert_eq!(second.files_processed, 0);

    let forced = f
        .client
        .analyze_project(AnalyzeProjectRequest {
            project: "webapp".to_string(),
            force_full: true,
        })
        .await
        .unwrap();
    assert_eq!(forced.mode, AnalysisMode::Full);
    assert_eq!(forced.total_chunks, 1);
}

#[tokio::test]
async fn test_concurrent_analyze_calls_share_one_result() {
    let f = fixture(true, None).await;
    write(&f.project_dir, "util.ts", UTIL_TS);
    write(&f.project_dir, "main.ts", MAIN_TS);
    f.client
        .create_project(create_request("webapp", &f.project_dir))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        f.client.analyze_project(analyze_request("webapp")),
        f.client.analyze_project(analyze_request("webapp"))
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.total_chunks, 2);
    assert_eq!(b.total_chunks, 2);
    assert!(f.client.indexing_ops.read().await.is_empty());
}

#[tokio::test]
async fn test_searches_and_dependencies() {
    let f = fixture(true, None).await;
    write(&f.project_dir, "util.ts", UTIL_TS);
    write(&f.project_dir, "main.ts", MAIN_TS);
    f.client
        .create_project(create_request("webapp", &f.project_dir))
        .await
        .unwrap();
    f.client.analyze_project(analyze_request("webapp")).await.unwrap();

    let similar = f
        .client
        .search_chunks(SearchChunksRequest {
            project: "webapp".to_string(),
            query: "export function add(a: number, b: number) { return a + b; }".to_string(),
            limit: Some(1),
            min_score: Some(0.0),
        })
        .await
        .unwrap();
    assert_eq!(similar.results.len(), 1);

    let keyword = f
        .client
        .search_keyword(KeywordSearchRequest {
            project: "webapp".to_string(),
            keyword: "run".to_string(),
            limit: None,
        })
        .await
        .unwrap();
    assert_eq!(keyword.results[0].name, "run");

    let deps = f
        .client
        .chunk_dependencies(ChunkDependenciesRequest {
            project: "webapp".to_string(),
            name: "add".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(deps.chunks.len(), 1);
    assert_eq!(deps.chunks[0].path, "util.ts");
    assert_eq!(deps.chunks[0].dependents, vec!["run"]);
    assert!(deps.transitive_dependencies.is_empty());

    let run = f
        .client
        .chunk_dependencies(ChunkDependenciesRequest {
            project: "webapp".to_string(),
            name: "run".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(run.transitive_dependencies, vec!["add"]);

    let missing = f
        .client
        .chunk_dependencies(ChunkDependenciesRequest {
            project: "webapp".to_string(),
            name: "nothing".to_string(),
        })
        .await;
    assert!(missing.is_err());
}

#[tokio::test]
async fn test_invalid_requests_rejected_before_work() {
    let f = fixture(true, None).await;
    let err = f
        .client
        .search_chunks(SearchChunksRequest {
            project: "webapp".to_string(),
            query: "   ".to_string(),
            limit: None,
            min_score: None,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Empty query"));

    let err = f
        .client
        .analyze_project(analyze_request("unknown"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ValidationError>(),
        Some(ValidationError::ProjectNotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_project_cascades() {
    let f = fixture(true, None).await;
    write(&f.project_dir, "util.ts", UTIL_TS);
    let info = f
        .client
        .create_project(create_request("webapp", &f.project_dir))
        .await
        .unwrap();
    f.client.analyze_project(analyze_request("webapp")).await.unwrap();

    let deleted = f
        .client
        .delete_project(DeleteProjectRequest {
            project: "webapp".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(deleted.chunks_deleted, 1);
    assert_eq!(f.client.store.count_chunks(&info.id).await.unwrap(), 0);
    assert!(f.client.list_projects().await.unwrap().projects.is_empty());
}
