use std::collections::HashSet;
use std::io::Read;

use crate::DocumentError;
use crate::entity::types::EntityDocument;

pub struct EntityReader {}

impl EntityReader {
    pub fn parse_document<R: Read>(rdr: &mut R) -> Result<EntityDocument, DocumentError> {
        let mut buf = Vec::new();
        rdr.read_to_end(&mut buf)?;
        Self::parse_slice(&buf)
    }

    pub fn parse_slice(buf: &[u8]) -> Result<EntityDocument, DocumentError> {
        if buf.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(DocumentError::EmptySource);
        }

        let document: EntityDocument = serde_json::from_slice(buf)?;
        Self::validate(&document)?;
        Ok(document)
    }

    pub fn write_document(document: &EntityDocument) -> Result<Vec<u8>, DocumentError> {
        Self::validate(document)?;
        Ok(serde_json::to_vec_pretty(document)?)
    }

    fn validate(document: &EntityDocument) -> Result<(), DocumentError> {
        if document.resource_id.trim().is_empty() {
            return Err(DocumentError::FormatError {
                reason: "missing resource_id".to_string(),
            });
        }

        // A node that contains itself would wait on its own children forever.
        if document.children.contains(&document.resource_id) {
            return Err(DocumentError::FormatError {
                reason: format!("{} lists itself as a child", document.resource_id),
            });
        }

        let mut seen = HashSet::with_capacity(document.children.len());
        if let Some(duplicate) = document.children.iter().find(|child| !seen.insert(*child)) {
            return Err(DocumentError::FormatError {
                reason: format!("child {} is listed more than once", duplicate),
            });
        }

        if document.transform.iter().any(|f| !f.is_finite()) {
            return Err(DocumentError::FormatError {
                reason: "transform contains non-finite values".to_string(),
            });
        }

        Ok(())
    }
}
