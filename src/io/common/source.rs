use crate::resources::LoadResponder;

/// Where handlers fetch raw data from, e.g. a directory, an archive or a remote service.
pub trait DataSource: Send + Sync {
    /// Fetches the data for `identifier` and answers the responder, either right away or later
    /// from any thread.
    fn fetch(&self, identifier: &str, responder: LoadResponder);
}
