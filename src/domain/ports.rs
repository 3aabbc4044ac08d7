use crate::domain::model::TransformResult;
use crate::utils::error::Result;
use async_trait::async_trait;

/// File access relative to the deck's data directory.
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
    /// File names (not paths) directly inside `dir`, sorted.
    fn list_files(&self, dir: &str) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
}

/// One stage of deck building.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Tables and payloads gathered by `extract`.
    type Input: Send;

    fn name(&self) -> &str;
    async fn extract(&self) -> Result<Self::Input>;
    async fn transform(&self, input: Self::Input) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}
