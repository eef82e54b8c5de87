//! Breadcrumb trail derivation

use crate::utils;

/// One navigable segment of the trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    /// Text to show (the root crumb uses the backend title)
    pub label: String,
    /// Absolute backend path this crumb navigates to
    pub path: String,
}

/// Ordered crumbs from the backend root to `path`.
///
/// A path equal to the root, or one that does not live under it, yields
/// only the root crumb.
pub fn breadcrumbs(root_title: &str, root_path: &str, path: &str) -> Vec<Breadcrumb> {
    let root_path = utils::normalize_path(root_path);
    let mut trail = vec![Breadcrumb {
        label: root_title.to_string(),
        path: root_path.clone(),
    }];

    let path = utils::normalize_path(path);
    let Some(relative) = utils::relative_to(&root_path, &path) else {
        return trail;
    };

    let mut current = root_path;
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        current = utils::join_path(&current, segment);
        trail.push(Breadcrumb {
            label: segment.to_string(),
            path: current.clone(),
        });
    }
    trail
}
