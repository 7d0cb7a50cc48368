//! Frames exchanged between a pool worker and its child process
//!
//! One JSON document per line:
//!
//! ```text
//! -> {"op":"call","id":7,"task":"square","args":12}
//! <- {"status":"ok","id":7,"value":144}
//! -> {"op":"shutdown"}
//! ```

use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tasklet_core::{Error, Result, TaskError};

/// Parent to child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Run a registered task
    Call { id: u64, task: String, args: Value },
    /// Exit the call loop
    Shutdown,
}

/// Child to parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Success { id: u64, value: Value },
    #[serde(rename = "err")]
    Failure {
        id: u64,
        message: String,
        panicked: bool,
    },
}

impl Response {
    pub fn from_result(id: u64, result: core::result::Result<Value, TaskError>) -> Self {
        match result {
            Ok(value) => Response::Success { id, value },
            Err(err) => Response::Failure {
                id,
                message: err.message().to_string(),
                panicked: err.is_panic(),
            },
        }
    }

    /// Request id this response answers
    pub fn id(&self) -> u64 {
        match self {
            Response::Success { id, .. } | Response::Failure { id, .. } => *id,
        }
    }

    pub fn into_result(self) -> core::result::Result<Value, TaskError> {
        match self {
            Response::Success { value, .. } => Ok(value),
            Response::Failure {
                message, panicked, ..
            } => Err(TaskError::remote(message, panicked)),
        }
    }
}

/// Write `message` as one line and flush
pub fn write_frame<W, M>(writer: &mut W, message: &M) -> Result<()>
where
    W: Write,
    M: Serialize,
{
    let mut line = serde_json::to_vec(message).map_err(|e| Error::Codec(e.to_string()))?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .and_then(|()| writer.flush())
        .map_err(|e| Error::Worker(format!("pipe write failed: {e}")))
}

/// Read one line and decode it; `Ok(None)` at end of stream
pub fn read_frame<R, M>(reader: &mut R) -> Result<Option<M>>
where
    R: BufRead,
    M: DeserializeOwned,
{
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) => Ok(None),
        Ok(_) => serde_json::from_str(line.trim_end())
            .map(Some)
            .map_err(|e| Error::Codec(e.to_string())),
        Err(e) => Err(Error::Worker(format!("pipe read failed: {e}"))),
    }
}
