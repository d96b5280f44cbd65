//! # Child Labels

use kube::Resource;
use std::collections::BTreeMap;

/// Parent labels passed through, then `extra` on top
pub fn child_labels<P>(parent: &P, extra: &[(&str, &str)]) -> BTreeMap<String, String>
where
    P: Resource,
{
    let mut labels = parent.meta().labels.clone().unwrap_or_default();
    labels.extend(
        extra
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned())),
    );
    labels
}

/// Field index of `child_kind` objects by the name of their controller of kind
/// `parent_kind`, e.g. `.metadata.kafkaProviderDeploymentController`
pub fn controller_index_field(parent_kind: &str, child_kind: &str) -> String {
    let mut chars = parent_kind.chars();
    let lowered = chars
        .next()
        .map(|first| first.to_lowercase().chain(chars).collect::<String>())
        .unwrap_or_default();
    format!(".metadata.{lowered}{child_kind}Controller")
}
