//! Reference [`Parser`]: treats every file as a single opaque `File` entity,
//! with no language-aware extraction. Enough to drive the pipeline
//! end-to-end without a real language frontend.

use std::path::Path;

use async_trait::async_trait;

use codegraph_core::{ChangeFragment, Entity, EntityKind, FragmentKind, FragmentOp, ParseError, ParseOutput, Parser};

/// Emits one `File` entity (and matching change fragment) per file, hashed
/// by content. Unreadable files surface a recoverable [`ParseError`] rather
/// than halting the run.
pub struct PassthroughParser;

#[async_trait]
impl Parser for PassthroughParser {
    async fn parse_file(&self, path: &Path) -> Result<ParseOutput, ParseError> {
        let path_str = path.to_string_lossy().to_string();
        let contents = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Ok(ParseOutput {
                    errors: vec![ParseError {
                        file: path_str,
                        error_type: "io".to_string(),
                        message: e.to_string(),
                        recoverable: true,
                        timestamp_millis: 0,
                    }],
                    ..ParseOutput::default()
                });
            }
        };

        let hash = fnv1a_hex(&contents);
        let id = format!("file:{path_str}");
        let entity = Entity { path: Some(path_str.clone()), ..Entity::new(id.clone(), EntityKind::File, hash, 0) };

        let fragment = ChangeFragment {
            id: format!("frag:{id}"),
            event_id: id.clone(),
            kind: FragmentKind::Entity,
            op: FragmentOp::Add,
            data: serde_json::to_value(&entity).unwrap_or(serde_json::Value::Null),
            dependency_hints: Vec::new(),
            confidence: 1.0,
        };

        Ok(ParseOutput { entities: vec![entity], relationships: Vec::new(), errors: Vec::new(), fragments: vec![fragment] })
    }
}

fn fnv1a_hex(data: &[u8]) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    format!("{hash:016x}")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn parses_file_into_single_entity_and_fragment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "fn main() {{}}").unwrap();

        let parser = PassthroughParser;
        let output = parser.parse_file(file.path()).await.unwrap();
        assert_eq!(output.entities.len(), 1);
        assert_eq!(output.fragments.len(), 1);
        assert!(output.errors.is_empty());
    }

    #[tokio::test]
    async fn missing_file_yields_recoverable_error() {
        let parser = PassthroughParser;
        let output = parser.parse_file(Path::new("/nonexistent/path/does-not-exist")).await.unwrap();
        assert!(output.entities.is_empty());
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].recoverable);
    }

    #[tokio::test]
    async fn same_content_produces_same_hash() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        write!(a, "identical").unwrap();
        write!(b, "identical").unwrap();

        let parser = PassthroughParser;
        let out_a = parser.parse_file(a.path()).await.unwrap();
        let out_b = parser.parse_file(b.path()).await.unwrap();
        assert_eq!(out_a.entities[0].hash, out_b.entities[0].hash);
    }
}
