//! Encode: typed objects to frame bytes, with hub-to-external conversion
//! and comment preservation (§4.3).

use gitops_core::{Object, Result};
use gitops_frame::FrameWriter;
use gitops_registry::Registry;

use crate::comments;
use crate::defaulting;

/// Encode options (§4.3).
#[derive(Clone, Copy, Debug, Default)]
pub struct EncodeOptions {
    pub pretty: bool,
    pub preserve_comments: bool,
}

/// Encodes objects onto a `FrameWriter` against a `Registry` (§4.3).
pub struct Encoder<'a> {
    registry: &'a Registry,
    writer: Box<dyn FrameWriter>,
    options: EncodeOptions,
}

impl<'a> Encoder<'a> {
    pub fn new(registry: &'a Registry, writer: Box<dyn FrameWriter>, options: EncodeOptions) -> Self {
        Self {
            registry,
            writer,
            options,
        }
    }

    /// Encode `obj`, converting to the preferred external version first if
    /// it is hub/internal.
    pub fn encode(&mut self, obj: Box<dyn Object>) -> Result<()> {
        let obj = defaulting::convert_to_preferred_external(self.registry, obj)?;
        self.encode_exact(obj.as_ref())
    }

    /// Encode `obj` converted onto `gv` first (§4.3 `encodeForGroupVersion`).
    pub fn encode_for_group_version(&mut self, obj: Box<dyn Object>, gv: gitops_core::GroupVersion) -> Result<()> {
        let converter = defaulting::Converter::new(self.registry);
        let converted = converter.convert_for_group_version(obj, gv)?;
        self.encode_exact(converted.as_ref())
    }

    pub fn encode_all(&mut self, objs: Vec<Box<dyn Object>>) -> Result<()> {
        for obj in objs {
            self.encode(obj)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }

    fn encode_exact(&mut self, obj: &dyn Object) -> Result<()> {
        let value = self.registry.encode(obj)?;

        let frame = if self.writer.content_type() == gitops_core::ContentType::Yaml {
            self.encode_yaml(obj, value)?
        } else {
            self.encode_json(value)?
        };

        self.writer.write_frame(&frame)
    }

    fn encode_json(&self, value: serde_json::Value) -> Result<Vec<u8>> {
        let bytes = if self.options.pretty {
            serde_json::to_vec_pretty(&value)?
        } else {
            serde_json::to_vec(&value)?
        };
        Ok(bytes)
    }

    /// Serialize `value` as YAML, splicing in preserved comments when
    /// requested and a comment-source annotation is present on `obj`
    /// (§4.3 Encode contract, "Annotation leakage").
    fn encode_yaml(&self, obj: &dyn Object, mut value: serde_json::Value) -> Result<Vec<u8>> {
        let original = if self.options.preserve_comments {
            gitops_core::comment_source(obj.metadata())
        } else {
            None
        };

        strip_comment_annotation(&mut value);

        let serialized = serde_yaml::to_string(&value)?;

        match original {
            Some(raw) => {
                let original_text = String::from_utf8_lossy(&raw);
                let index = comments::extract(&original_text);
                Ok(comments::merge(&serialized, &index).into_bytes())
            }
            None => Ok(serialized.into_bytes()),
        }
    }
}

/// Remove the comment-source annotation key from an encoded value tree so
/// it never leaks into output bytes.
fn strip_comment_annotation(value: &mut serde_json::Value) {
    if let Some(annotations) = value
        .get_mut("metadata")
        .and_then(|m| m.get_mut("annotations"))
        .and_then(|a| a.as_object_mut())
    {
        annotations.remove(gitops_core::COMMENT_SOURCE_ANNOTATION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitops_core::{GroupVersionKind, ObjectMeta, TypeMeta};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct SimpleV1Alpha1 {
        #[serde(flatten)]
        type_meta: TypeMeta,
        #[serde(default)]
        metadata: ObjectMeta,
        #[serde(default)]
        test_string: String,
    }

    impl Object for SimpleV1Alpha1 {
        fn gvk(&self) -> GroupVersionKind {
            self.type_meta.gvk()
        }
        fn set_gvk(&mut self, gvk: GroupVersionKind) {
            self.type_meta = TypeMeta::from_gvk(&gvk);
        }
        fn metadata(&self) -> &ObjectMeta {
            &self.metadata
        }
        fn metadata_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn gvk() -> GroupVersionKind {
        GroupVersionKind::new("foogroup", "v1alpha1", "Simple")
    }

    fn registry() -> Registry {
        Registry::builder().register::<SimpleV1Alpha1>(gvk()).build()
    }

    #[test]
    fn encodes_yaml_frame() {
        let registry = registry();
        let mut obj = SimpleV1Alpha1::default();
        obj.set_gvk(gvk());
        obj.metadata.name = "foo".into();

        let mut buf = Vec::new();
        {
            let writer = gitops_frame::frame_writer(gitops_core::ContentType::Yaml, &mut buf);
            let mut encoder = Encoder::new(&registry, writer, EncodeOptions::default());
            encoder.encode(Box::new(obj)).unwrap();
            encoder.flush().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("name: foo"));
        assert!(text.contains("apiVersion: foogroup/v1alpha1"));
    }

    #[test]
    fn annotation_never_leaks_into_output() {
        let registry = registry();
        let mut obj = SimpleV1Alpha1::default();
        obj.set_gvk(gvk());
        obj.metadata.name = "foo".into();
        gitops_core::set_comment_source(&mut obj.metadata, b"apiVersion: foogroup/v1alpha1\nkind: Simple\nmetadata:\n  name: foo # hi\n");

        let mut buf = Vec::new();
        {
            let writer = gitops_frame::frame_writer(gitops_core::ContentType::Yaml, &mut buf);
            let options = EncodeOptions {
                preserve_comments: true,
                ..EncodeOptions::default()
            };
            let mut encoder = Encoder::new(&registry, writer, options);
            encoder.encode(Box::new(obj)).unwrap();
            encoder.flush().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains(gitops_core::COMMENT_SOURCE_ANNOTATION));
        assert!(text.contains("# hi"));
    }
}
