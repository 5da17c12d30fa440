// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Decision audit sink.
//!
//! One JSON line per decision that carries audit metadata. Write failures
//! are logged and swallowed; auditing must never affect traffic.

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::error;

use crate::protocol::{AuditRecord, DecisionPayload, RequestKey};

#[derive(Serialize)]
struct AuditEntry<'a> {
    timestamp: f64,
    connection_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_key: Option<String>,
    decision: &'a str,
    audit: &'a AuditRecord,
}

pub struct AuditLog {
    writer: Mutex<File>,
}

impl AuditLog {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(file),
        })
    }

    /// Append one entry if the payload carries audit metadata.
    pub fn record(
        &self,
        connection_id: &str,
        key: Option<&RequestKey>,
        payload: &DecisionPayload,
    ) {
        let Some(audit) = payload.audit.as_ref() else {
            return;
        };
        let entry = AuditEntry {
            timestamp: epoch_seconds(),
            connection_id,
            request_key: key.map(|k| k.to_string()),
            decision: payload.decision().kind(),
            audit,
        };
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit entry: {}", e);
                return;
            }
        };
        let mut file = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(file, "{}", line) {
            error!("Failed to write audit log: {}", e);
        }
    }
}

fn epoch_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Decision;

    #[test]
    fn records_only_audited_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();

        let silent = Decision::allow().build();
        log.record("conn-1", None, &silent);

        let audited = Decision::block().with_tag("blocked").build();
        log.record("conn-1", Some(&RequestKey::Id(7)), &audited);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["decision"], "block");
        assert_eq!(v["request_key"], "7");
        assert_eq!(v["audit"]["tags"][0], "blocked");
    }
}
