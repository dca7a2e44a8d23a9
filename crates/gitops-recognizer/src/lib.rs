//! Recognizes an opaque byte frame's identity without needing its concrete
//! type registered (§4.4): decodes it as a metadata-only `Partial`,
//! validates the required fields, and optionally rejects unregistered
//! GVKs.

use gitops_core::{ContentType, Error, FieldError, GroupVersionKind, ObjectId, Partial, Result};
use gitops_registry::Registry;

/// Recognizer options (§4.4).
#[derive(Clone, Copy, Debug, Default)]
pub struct RecognizerOptions {
    /// Fail if the frame's GVK is not registered. Off by default since the
    /// recognizer is also used ahead of `decodeUnknown`-style flows.
    pub require_registered: bool,
}

pub struct Recognizer<'a> {
    registry: &'a Registry,
    options: RecognizerOptions,
}

impl<'a> Recognizer<'a> {
    pub fn new(registry: &'a Registry, options: RecognizerOptions) -> Self {
        Self { registry, options }
    }

    /// Recognize a single frame's identity (§4.4).
    pub fn recognize(&self, content_type: ContentType, frame: &[u8]) -> Result<ObjectId> {
        let partial = decode_partial(content_type, frame)?;
        let gvk = partial.type_meta.gvk();
        validate(&gvk, &partial)?;

        if self.options.require_registered && !self.registry.is_registered(&gvk) {
            return Err(Error::UnrecognizedType {
                gvk,
                cause: self.registry.classify_unrecognized(&partial.type_meta.gvk()),
                raw_bytes: frame.to_vec(),
            });
        }

        Ok(ObjectId::new(gvk, partial.metadata.name, partial.metadata.namespace))
    }
}

fn decode_partial(content_type: ContentType, frame: &[u8]) -> Result<Partial> {
    match content_type {
        ContentType::Yaml => {
            let text = std::str::from_utf8(frame).map_err(|e| Error::other(e.to_string()))?;
            Ok(serde_yaml::from_str(text)?)
        }
        ContentType::Json => Ok(serde_json::from_slice(frame)?),
    }
}

fn validate(gvk: &GroupVersionKind, partial: &Partial) -> Result<()> {
    let mut errors = Vec::new();
    if gvk.kind.is_empty() {
        errors.push(FieldError::new("kind", "must not be empty"));
    }
    if partial.type_meta.api_version.is_empty() {
        errors.push(FieldError::new("apiVersion", "must not be empty"));
    }
    if partial.metadata.name.is_empty() {
        errors.push(FieldError::new("metadata.name", "must not be empty"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Invalid {
            id: gitops_core::UnversionedObjectId::new(gvk.group_kind(), &partial.metadata.name, &partial.metadata.namespace),
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::builder().build()
    }

    #[test]
    fn recognizes_a_well_formed_frame() {
        let recognizer = Recognizer::new(&registry(), RecognizerOptions::default());
        let frame = b"apiVersion: foogroup/v1alpha1\nkind: Simple\nmetadata:\n  name: foo\n  namespace: ns1\n";
        let id = recognizer.recognize(ContentType::Yaml, frame).unwrap();
        assert_eq!(id.name, "foo");
        assert_eq!(id.namespace, "ns1");
        assert_eq!(id.gvk.kind.as_str(), "Simple");
    }

    #[test]
    fn rejects_missing_name() {
        let recognizer = Recognizer::new(&registry(), RecognizerOptions::default());
        let frame = b"apiVersion: foogroup/v1alpha1\nkind: Simple\nmetadata: {}\n";
        let err = recognizer.recognize(ContentType::Yaml, frame).unwrap_err();
        assert!(matches!(err, Error::Invalid { .. }));
    }

    #[test]
    fn rejects_missing_kind_and_api_version() {
        let recognizer = Recognizer::new(&registry(), RecognizerOptions::default());
        let frame = b"metadata:\n  name: foo\n";
        let err = recognizer.recognize(ContentType::Yaml, frame).unwrap_err();
        match err {
            Error::Invalid { errors, .. } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn require_registered_rejects_unknown_gvk() {
        let options = RecognizerOptions {
            require_registered: true,
        };
        let recognizer = Recognizer::new(&registry(), options);
        let frame = b"apiVersion: foogroup/v1alpha1\nkind: Simple\nmetadata:\n  name: foo\n";
        let err = recognizer.recognize(ContentType::Yaml, frame).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedType { .. }));
    }
}
