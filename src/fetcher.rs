//! Cursor-driven listing of a folder's children

use std::sync::Arc;
use tracing::debug;

use crate::error::DriveError;
use crate::providers::{
    escape_id, DriveClient, ListRequest, RemoteFileRef, FOLDER_MIME_TYPE, ORDER_BY_FILE_NAME,
};

/// Which half of a folder's children to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Folders,
    Files,
}

/// Query selecting the children of `parent_id` of the given kind
pub fn build_query(parent_id: &str, kind: ChildKind) -> String {
    let op = match kind {
        ChildKind::Folders => "=",
        ChildKind::Files => "!=",
    };
    format!(
        "'{}' in parentFolder and mimeType{}'{}'",
        escape_id(parent_id),
        op,
        FOLDER_MIME_TYPE
    )
}

/// Drains one listing query across all of its pages
#[derive(Clone)]
pub struct PageFetcher {
    drive: Arc<dyn DriveClient>,
}

impl PageFetcher {
    pub fn new(drive: Arc<dyn DriveClient>) -> Self {
        Self { drive }
    }

    /// All children of `parent_id` of the given kind, ordered by name.
    ///
    /// Pages are concatenated in the order the backend returns them. The loop
    /// stops as soon as a page comes back with an empty or absent cursor. Any
    /// failed page fails the whole listing.
    pub async fn list_children(
        &self,
        parent_id: &str,
        kind: ChildKind,
    ) -> Result<Vec<RemoteFileRef>, DriveError> {
        let mut request = ListRequest {
            query: build_query(parent_id, kind),
            order_by: ORDER_BY_FILE_NAME.to_string(),
            cursor: None,
        };
        let mut children = Vec::new();
        let mut pages = 0usize;

        loop {
            let page = self
                .drive
                .list_files(&request)
                .await
                .map_err(DriveError::ListingFailed)?;
            pages += 1;
            children.extend(page.files);

            match page.next_cursor {
                Some(cursor) if !cursor.is_empty() => request.cursor = Some(cursor),
                _ => break,
            }
        }

        debug!(
            "Listed {} {:?} under '{}' in {} page(s)",
            children.len(),
            kind,
            parent_id,
            pages
        );
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{Call, MockDrive};
    use crate::providers::{FileList, ProviderError};

    fn page(names: &[&str], cursor: Option<&str>) -> FileList {
        FileList {
            files: names
                .iter()
                .map(|n| RemoteFileRef::file(n, n, "text/plain", 1, Some("root")))
                .collect(),
            next_cursor: cursor.map(str::to_string),
        }
    }

    fn list_cursors(drive: &MockDrive) -> Vec<Option<String>> {
        drive
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::List { cursor, .. } => Some(cursor),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_build_query() {
        assert_eq!(
            build_query("root", ChildKind::Folders),
            "'root' in parentFolder and mimeType='application/vnd.huawei-apps.folder'"
        );
        assert_eq!(
            build_query("f1", ChildKind::Files),
            "'f1' in parentFolder and mimeType!='application/vnd.huawei-apps.folder'"
        );
    }

    #[tokio::test]
    async fn test_concatenates_pages_in_order() {
        let drive = Arc::new(MockDrive::new());
        drive.push_page(Ok(page(&["a", "b"], Some("c1"))));
        drive.push_page(Ok(page(&["c"], Some("c2"))));
        drive.push_page(Ok(page(&["d", "e"], None)));

        let fetcher = PageFetcher::new(drive.clone());
        let children = fetcher.list_children("root", ChildKind::Files).await.unwrap();
        let ids: Vec<_> = children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(
            list_cursors(&drive),
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_cursor_stops_pagination() {
        let drive = Arc::new(MockDrive::new());
        drive.push_page(Ok(page(&["a"], Some("c1"))));
        drive.push_page(Ok(page(&["b"], Some(""))));
        drive.push_page(Ok(page(&["never"], None)));

        let fetcher = PageFetcher::new(drive.clone());
        let children = fetcher.list_children("root", ChildKind::Files).await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(list_cursors(&drive).len(), 2);
    }

    #[tokio::test]
    async fn test_every_page_carries_same_query_and_order() {
        let drive = Arc::new(MockDrive::new());
        drive.push_page(Ok(page(&[], Some("c1"))));
        drive.push_page(Ok(page(&[], None)));

        let fetcher = PageFetcher::new(drive.clone());
        let children = fetcher.list_children("f1", ChildKind::Folders).await.unwrap();
        assert!(children.is_empty());

        for call in drive.calls() {
            match call {
                Call::List { query, .. } => assert_eq!(query, build_query("f1", ChildKind::Folders)),
                other => panic!("unexpected call {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_failed_page_fails_whole_listing() {
        let drive = Arc::new(MockDrive::new());
        drive.push_page(Ok(page(&["a"], Some("c1"))));
        drive.push_page(Err(ProviderError::NetworkError("reset".to_string())));
        drive.push_page(Ok(page(&["b"], None)));

        let fetcher = PageFetcher::new(drive.clone());
        let err = fetcher.list_children("root", ChildKind::Files).await.unwrap_err();
        assert!(matches!(err, DriveError::ListingFailed(ProviderError::NetworkError(_))));
        // no retry after the failure
        assert_eq!(list_cursors(&drive).len(), 2);
    }
}
