//! The comment-source side-channel annotation (§3, §6).
//!
//! Comment preservation stores the original YAML frame bytes, base64
//! encoded, under a fixed annotation key. The annotation is strictly
//! internal: any encode path must strip it before writing bytes and restore
//! it afterwards (a scoped acquire/release, see `gitops-serializer`).

use crate::meta::ObjectMeta;

/// `serializer.libgitops.weave.works/original-data`
pub const COMMENT_SOURCE_ANNOTATION: &str = "serializer.libgitops.weave.works/original-data";

/// Stash the original frame bytes into `meta`'s comment-source annotation,
/// base64 encoding (standard alphabet, with padding) as specified in §6.
pub fn set_comment_source(meta: &mut ObjectMeta, original: &[u8]) {
    let encoded = base64::encode(original);
    meta.annotations
        .insert(COMMENT_SOURCE_ANNOTATION.to_string(), encoded);
}

/// Retrieve and decode the comment-source annotation, if present.
pub fn comment_source(meta: &ObjectMeta) -> Option<Vec<u8>> {
    let encoded = meta.annotations.get(COMMENT_SOURCE_ANNOTATION)?;
    base64::decode(encoded).ok()
}

/// Remove the comment-source annotation, returning its decoded bytes if it
/// was present. Used to scope its visibility out of encoded output.
pub fn take_comment_source(meta: &mut ObjectMeta) -> Option<Vec<u8>> {
    let encoded = meta.annotations.remove(COMMENT_SOURCE_ANNOTATION)?;
    base64::decode(encoded).ok()
}
