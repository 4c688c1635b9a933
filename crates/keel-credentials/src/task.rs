// task.rs — Approval tasks raised when an agent asks for credential access.
//
// The access layer only needs something that can create a task and hand
// back its id: the `ApprovalTaskCreator` trait. `TaskInbox` is the file
// implementation, one JSON file per task: `<dir>/<task_id>.json`, so an
// operator can inspect pending requests by hand.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CredentialError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    ApprovalGate,
}

/// What the access layer asks the task system to create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalTaskRequest {
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub metadata: serde_json::Value,
}

/// Reference to a task created by an [`ApprovalTaskCreator`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalTaskRef {
    pub task_id: String,
}

/// Collaborator that turns an access request into a human-reviewable task.
pub trait ApprovalTaskCreator: Send + Sync {
    fn create_approval_task(
        &self,
        request: ApprovalTaskRequest,
    ) -> Result<ApprovalTaskRef, CredentialError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalTaskStatus {
    Pending,
}

/// A task as persisted in the inbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalTask {
    pub task_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: ApprovalTaskStatus,
    #[serde(flatten)]
    pub request: ApprovalTaskRequest,
}

/// File-backed task inbox.
#[derive(Debug, Clone)]
pub struct TaskInbox {
    dir: PathBuf,
}

impl TaskInbox {
    /// Open (and create if needed) the inbox directory.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| CredentialError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn task_file(&self, task_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", task_id))
    }

    pub fn get(&self, task_id: Uuid) -> Result<Option<ApprovalTask>, CredentialError> {
        let path = self.task_file(task_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(|source| CredentialError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// All tasks, newest first. Unparseable files are skipped.
    pub fn list(&self) -> Result<Vec<ApprovalTask>, CredentialError> {
        let io_err = |source: std::io::Error| CredentialError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut tasks = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let Ok(json) = fs::read_to_string(&path) else {
                continue;
            };
            match serde_json::from_str::<ApprovalTask>(&json) {
                Ok(task) => tasks.push(task),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable task file"),
            }
        }
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }
}

impl ApprovalTaskCreator for TaskInbox {
    fn create_approval_task(
        &self,
        request: ApprovalTaskRequest,
    ) -> Result<ApprovalTaskRef, CredentialError> {
        let task = ApprovalTask {
            task_id: Uuid::new_v4(),
            created_at: Utc::now(),
            status: ApprovalTaskStatus::Pending,
            request,
        };
        let path = self.task_file(task.task_id);
        let json = serde_json::to_string_pretty(&task)?;
        fs::write(&path, json)
            .map_err(|e| CredentialError::TaskCreation(format!("{}: {}", path.display(), e)))?;

        tracing::info!(task_id = %task.task_id, title = %task.request.title, "created approval task");
        Ok(ApprovalTaskRef {
            task_id: task.task_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn request(title: &str) -> ApprovalTaskRequest {
        ApprovalTaskRequest {
            title: title.into(),
            description: "agent wants access".into(),
            task_type: TaskType::ApprovalGate,
            metadata: json!({"credentialId": "openai"}),
        }
    }

    #[test]
    fn create_and_read_back() {
        let dir = tempdir().unwrap();
        let inbox = TaskInbox::new(dir.path().join("inbox")).unwrap();
        let created = inbox.create_approval_task(request("Access to OpenAI")).unwrap();

        let id: Uuid = created.task_id.parse().unwrap();
        let task = inbox.get(id).unwrap().unwrap();
        assert_eq!(task.status, ApprovalTaskStatus::Pending);
        assert_eq!(task.request.title, "Access to OpenAI");
        assert_eq!(task.request.metadata["credentialId"], "openai");

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(inbox.dir().join(format!("{}.json", id))).unwrap())
                .unwrap();
        assert_eq!(raw["task_type"], "approval_gate");
        assert_eq!(raw["status"], "pending");
    }

    #[test]
    fn list_skips_foreign_files() {
        let dir = tempdir().unwrap();
        let inbox = TaskInbox::new(dir.path()).unwrap();
        inbox.create_approval_task(request("one")).unwrap();
        inbox.create_approval_task(request("two")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();

        assert_eq!(inbox.list().unwrap().len(), 2);
    }

    #[test]
    fn missing_task_is_none() {
        let dir = tempdir().unwrap();
        let inbox = TaskInbox::new(dir.path()).unwrap();
        assert!(inbox.get(Uuid::new_v4()).unwrap().is_none());
    }
}
