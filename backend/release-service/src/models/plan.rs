use crate::models::ContentObject;
use s3_utils::RemoteObject;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Delete remote objects with no local counterpart (mirror)
    pub delete_extraneous: bool,
    /// Cache-Control header written on every upload
    pub cache_control: Option<String>,
}

impl SyncOptions {
    /// Mirror semantics used by every release
    pub fn mirror() -> Self {
        Self {
            delete_extraneous: true,
            cache_control: None,
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::mirror()
    }
}

/// Diff between the local content tree and the remote listing
///
/// A path lands in exactly one of `to_upload`, `to_delete` or `unchanged`.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub to_upload: BTreeMap<String, ContentObject>,
    pub to_delete: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

impl SyncPlan {
    pub fn compute(local: Vec<ContentObject>, remote: &[RemoteObject], options: &SyncOptions) -> Self {
        let remote_etags: BTreeMap<&str, Option<&str>> = remote
            .iter()
            .map(|obj| (obj.key.as_str(), obj.etag.as_deref()))
            .collect();

        let mut plan = SyncPlan::default();

        for object in local {
            match remote_etags.get(object.path.as_str()) {
                Some(Some(etag)) if *etag == object.content_hash => {
                    plan.unchanged.insert(object.path);
                }
                _ => {
                    plan.to_upload.insert(object.path.clone(), object);
                }
            }
        }

        if options.delete_extraneous {
            plan.to_delete = remote
                .iter()
                .map(|obj| obj.key.clone())
                .filter(|key| !plan.to_upload.contains_key(key) && !plan.unchanged.contains(key))
                .collect();
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty() && self.to_delete.is_empty()
    }

    pub fn operation_count(&self) -> usize {
        self.to_upload.len() + self.to_delete.len()
    }

    /// Keys whose remote state this plan changes
    pub fn changed_paths(&self) -> BTreeSet<String> {
        self.to_upload
            .keys()
            .chain(self.to_delete.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3_utils::content_etag;

    fn remote(key: &str, body: &[u8]) -> RemoteObject {
        RemoteObject {
            key: key.to_string(),
            etag: Some(content_etag(body)),
            size: body.len() as u64,
            last_modified: None,
        }
    }

    #[test]
    fn test_plan_classifies_every_path_once() {
        let local = vec![
            ContentObject::new("index.html", b"new".to_vec()),
            ContentObject::new("about.html", b"same".to_vec()),
            ContentObject::new("new.css", b"css".to_vec()),
        ];
        let remote = vec![
            remote("index.html", b"old"),
            remote("about.html", b"same"),
            remote("stale.js", b"js"),
        ];

        let plan = SyncPlan::compute(local, &remote, &SyncOptions::mirror());

        assert_eq!(
            plan.to_upload.keys().cloned().collect::<Vec<_>>(),
            vec!["index.html".to_string(), "new.css".to_string()]
        );
        assert_eq!(plan.to_delete, BTreeSet::from(["stale.js".to_string()]));
        assert_eq!(plan.unchanged, BTreeSet::from(["about.html".to_string()]));
        assert!(plan
            .to_upload
            .keys()
            .all(|k| !plan.to_delete.contains(k)));
    }

    #[test]
    fn test_without_delete_extraneous_keeps_remote_only_objects() {
        let plan = SyncPlan::compute(
            vec![ContentObject::new("index.html", b"x".to_vec())],
            &[remote("legacy.html", b"y")],
            &SyncOptions {
                delete_extraneous: false,
                cache_control: None,
            },
        );

        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.operation_count(), 1);
    }

    #[test]
    fn test_multipart_etag_forces_upload() {
        let mut listed = remote("video.mp4", b"data");
        listed.etag = Some("0123abcd-3".to_string());

        let plan = SyncPlan::compute(
            vec![ContentObject::new("video.mp4", b"data".to_vec())],
            &[listed],
            &SyncOptions::mirror(),
        );

        assert!(plan.to_upload.contains_key("video.mp4"));
    }

    #[test]
    fn test_identical_trees_produce_empty_plan() {
        let plan = SyncPlan::compute(
            vec![ContentObject::new("index.html", b"x".to_vec())],
            &[remote("index.html", b"x")],
            &SyncOptions::mirror(),
        );

        assert!(plan.is_empty());
        assert!(plan.changed_paths().is_empty());
    }
}
