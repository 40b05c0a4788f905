//! The `path_parser` Worker: pure computation over
//! `sonicat::pathparse::parse_path`, per `spec.md` §4.4's
//! `path_parser.parse(file_paths[])`. Writes nothing itself — the
//! `app_data` worker holds the `TokenStore` write handle (`spec.md`
//! §2's "writes funneled through app_data"), so this worker's only job
//! is to attach the parsed tokens as a result payload and let the
//! `AppRunner`'s routing (rule 3: `AppType::Tokens` -> `app_data`) carry
//! it onward.

use async_trait::async_trait;
use sonicat::catalog::FileRecord;
use sonicat::pathparse::parse_path;
use sonicat::router::AppType;
use sonicat::task::{Task, TaskResult};

pub struct PathParserWorker;

impl PathParserWorker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PathParserWorker {
    fn default() -> Self {
        Self::new()
    }
}

/// One file's parse result, keyed by `file_id` so `app_data` can record
/// it without re-deriving anything from the path.
#[derive(serde::Serialize, serde::Deserialize)]
pub struct FileTokens {
    pub file_id: i64,
    pub tempo: Option<u32>,
    pub key: String,
    pub tokens: Vec<String>,
}

#[async_trait]
impl crate::Worker for PathParserWorker {
    fn app_name(&self) -> &'static str {
        "path_parser"
    }

    fn app_type(&self) -> AppType {
        AppType::Tokens
    }

    async fn run_task(&self, mut task: Task) -> Task {
        let cname = task.args.get("cname").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let files: Vec<FileRecord> = match task.args.get("file_data") {
            Some(v) => serde_json::from_value(v.clone()).unwrap_or_default(),
            None => Vec::new(),
        };

        let parsed: Vec<FileTokens> = files
            .iter()
            .map(|f| {
                let relative = if f.dirname.is_empty() {
                    format!("{cname}/{}", f.basename)
                } else {
                    format!("{cname}/{}/{}", f.dirname, f.basename)
                };
                let parsed = parse_path(&relative);
                FileTokens { file_id: f.id, tempo: parsed.tempo, key: parsed.key, tokens: parsed.tokens }
            })
            .collect();

        let payload = serde_json::to_value(parsed).unwrap_or(serde_json::Value::Null);
        task.results.push(TaskResult::ok(payload));
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Worker;

    #[tokio::test]
    async fn tokenizes_every_file_in_the_task() {
        let worker = PathParserWorker::new();
        let task = Task::new(
            "1".into(),
            "path_parser",
            "parse",
            serde_json::json!({
                "asset_id": 1,
                "cname": "Acme Sounds - Pack Vol 1",
                "catalog": "samples",
                "temp_path": "/tmp/sonicat-tasks/Acme Sounds - Pack Vol 1",
                "file_data": [{"id": 10, "asset_id": 1, "dirname": "", "basename": "Drums 128bpm Kick.wav", "size": 17, "filetype": "wav"}],
            }),
        );

        let done = worker.run_task(task).await;
        assert!(done.succeeded());
        let parsed: Vec<FileTokens> = serde_json::from_value(done.last_result().unwrap().payload.clone()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].file_id, 10);
        assert_eq!(parsed[0].tempo, Some(128));
        assert!(parsed[0].tokens.contains(&"kick".to_string()));
    }
}
