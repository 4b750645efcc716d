use crate::domain::ports::Pipeline;
use crate::utils::error::Result;

/// Drives the extract, transform and load stages of a report run.
pub struct ReportEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> ReportEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("Starting report generation");

        let extraction = self.pipeline.extract().await?;
        tracing::info!(
            "Fetched activity for {} people and {} components",
            extraction.people.len(),
            extraction.components.len()
        );

        let bundle = self.pipeline.transform(extraction).await?;
        tracing::info!("Rendered {} documents", bundle.documents.len());

        let index = self.pipeline.load(bundle).await?;
        tracing::info!("Output written to {}", index);

        Ok(index)
    }
}
