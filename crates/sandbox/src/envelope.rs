//! Connect-protocol framing used by the in-sandbox process daemon.
//!
//! Each frame is one flag byte, a big-endian `u32` payload length, then the JSON payload. The
//! final frame of a server stream carries [`END_STREAM_FLAG`] and an optional error.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use crate::{CommandOutput, SandboxError};

pub const END_STREAM_FLAG: u8 = 0x02;
const HEADER_LEN: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub flags: u8,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn is_end_stream(&self) -> bool {
        self.flags & END_STREAM_FLAG != 0
    }
}

pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(0);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

pub fn decode_all(mut bytes: &[u8]) -> Result<Vec<Envelope>, SandboxError> {
    let mut envelopes = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < HEADER_LEN {
            return Err(SandboxError::Protocol(format!(
                "truncated frame header ({} bytes)",
                bytes.len()
            )));
        }
        let flags = bytes[0];
        let length = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        let rest = &bytes[HEADER_LEN..];
        if rest.len() < length {
            return Err(SandboxError::Protocol(format!(
                "truncated frame payload (expected {length} bytes, got {})",
                rest.len()
            )));
        }
        envelopes.push(Envelope { flags, payload: rest[..length].to_vec() });
        bytes = &rest[length..];
    }
    Ok(envelopes)
}

#[derive(Debug, Default, Deserialize)]
struct StartResponse {
    event: Option<ProcessEvent>,
}

#[derive(Debug, Default, Deserialize)]
struct ProcessEvent {
    data: Option<DataEvent>,
    end: Option<EndEvent>,
}

#[derive(Debug, Default, Deserialize)]
struct DataEvent {
    stdout: Option<String>,
    stderr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndEvent {
    #[serde(default)]
    exit_code: i32,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EndStream {
    error: Option<ConnectError>,
}

#[derive(Debug, Default, Deserialize)]
struct ConnectError {
    code: Option<String>,
    message: Option<String>,
}

/// Folds a decoded process stream into captured output.
pub fn collect_output(envelopes: &[Envelope]) -> Result<CommandOutput, SandboxError> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit: Option<EndEvent> = None;

    for envelope in envelopes {
        if envelope.is_end_stream() {
            let end: EndStream = parse_payload(&envelope.payload)?;
            if let Some(error) = end.error {
                return Err(SandboxError::Command(format!(
                    "{}: {}",
                    error.code.unwrap_or_else(|| "unknown".to_string()),
                    error.message.unwrap_or_default()
                )));
            }
            continue;
        }

        let message: StartResponse = parse_payload(&envelope.payload)?;
        let Some(event) = message.event else {
            continue;
        };
        if let Some(data) = event.data {
            if let Some(chunk) = data.stdout {
                stdout.extend(decode_chunk(&chunk)?);
            }
            if let Some(chunk) = data.stderr {
                stderr.extend(decode_chunk(&chunk)?);
            }
        }
        if let Some(end) = event.end {
            exit = Some(end);
        }
    }

    let end = exit.ok_or_else(|| {
        SandboxError::Protocol("process stream ended without an exit event".to_string())
    })?;
    if let Some(error) = end.error.filter(|error| !error.is_empty()) {
        stderr.extend(error.into_bytes());
    }

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: end.exit_code,
    })
}

fn parse_payload<T: for<'de> Deserialize<'de> + Default>(payload: &[u8]) -> Result<T, SandboxError> {
    if payload.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(payload)
        .map_err(|error| SandboxError::Protocol(format!("invalid frame payload: {error}")))
}

fn decode_chunk(chunk: &str) -> Result<Vec<u8>, SandboxError> {
    STANDARD
        .decode(chunk)
        .map_err(|error| SandboxError::Protocol(format!("invalid output chunk: {error}")))
}

/// Request body for `process.Process/Start`.
pub fn start_request(command: &str, envs: &[(&str, &str)]) -> Value {
    let envs: serde_json::Map<String, Value> = envs
        .iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect();
    serde_json::json!({
        "process": {
            "cmd": "/bin/bash",
            "args": ["-l", "-c", command],
            "envs": envs,
        }
    })
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde_json::json;

    use super::{collect_output, decode_all, encode, start_request, Envelope, END_STREAM_FLAG};
    use crate::SandboxError;

    fn frame(flags: u8, value: serde_json::Value) -> Vec<u8> {
        let mut bytes = encode(value.to_string().as_bytes());
        bytes[0] = flags;
        bytes
    }

    fn stdout_event(text: &str) -> serde_json::Value {
        json!({"event": {"data": {"stdout": STANDARD.encode(text)}}})
    }

    #[test]
    fn frames_decode_back_to_payloads() {
        let mut bytes = encode(b"{}");
        bytes.extend(encode(b"{\"a\":1}"));

        let envelopes = decode_all(&bytes).expect("decodes");
        assert_eq!(
            envelopes,
            vec![
                Envelope { flags: 0, payload: b"{}".to_vec() },
                Envelope { flags: 0, payload: b"{\"a\":1}".to_vec() },
            ]
        );
    }

    #[test]
    fn truncated_frames_are_protocol_errors() {
        let bytes = encode(b"{\"a\":1}");
        assert!(matches!(decode_all(&bytes[..3]), Err(SandboxError::Protocol(_))));
        assert!(matches!(decode_all(&bytes[..bytes.len() - 1]), Err(SandboxError::Protocol(_))));
    }

    #[test]
    fn output_chunks_concatenate_in_order() {
        let mut bytes = frame(0, json!({"event": {"start": {"pid": 7}}}));
        bytes.extend(frame(0, stdout_event("1200")));
        bytes.extend(frame(0, json!({"event": {"keepalive": {}}})));
        bytes.extend(frame(0, stdout_event("00\n")));
        bytes.extend(frame(0, json!({"event": {"data": {"stderr": STANDARD.encode("warn")}}})));
        bytes.extend(frame(0, json!({"event": {"end": {"exited": true, "status": "exit status 0"}}})));
        bytes.extend(frame(END_STREAM_FLAG, json!({})));

        let output = collect_output(&decode_all(&bytes).expect("decodes")).expect("collects");
        assert_eq!(output.stdout, "120000\n");
        assert_eq!(output.stderr, "warn");
        assert_eq!(output.exit_code, 0);
        assert!(output.succeeded());
    }

    #[test]
    fn non_zero_exit_code_is_reported_not_raised() {
        let mut bytes = frame(0, json!({"event": {"end": {"exitCode": 127, "exited": true}}}));
        bytes.extend(frame(END_STREAM_FLAG, json!({})));

        let output = collect_output(&decode_all(&bytes).expect("decodes")).expect("collects");
        assert_eq!(output.exit_code, 127);
        assert!(!output.succeeded());
    }

    #[test]
    fn end_stream_error_becomes_command_error() {
        let mut bytes = frame(0, stdout_event("partial"));
        bytes.extend(frame(
            END_STREAM_FLAG,
            json!({"error": {"code": "unauthenticated", "message": "bad token"}}),
        ));

        let error = collect_output(&decode_all(&bytes).expect("decodes")).expect_err("fails");
        assert!(matches!(error, SandboxError::Command(ref message) if message.contains("bad token")));
    }

    #[test]
    fn missing_exit_event_is_protocol_error() {
        let bytes = frame(0, stdout_event("partial"));
        let error = collect_output(&decode_all(&bytes).expect("decodes")).expect_err("fails");
        assert!(matches!(error, SandboxError::Protocol(_)));
    }

    #[test]
    fn start_request_wraps_command_in_login_shell() {
        let body = start_request("python3 -c 'print(1)'", &[("TOKEN", "abc")]);
        assert_eq!(
            body,
            json!({"process": {
                "cmd": "/bin/bash",
                "args": ["-l", "-c", "python3 -c 'print(1)'"],
                "envs": {"TOKEN": "abc"},
            }})
        );
    }
}
