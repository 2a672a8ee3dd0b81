//! `deepdive status`: show a stored research record.

use deepdive_core::error::PipelineError;
use deepdive_pipeline::{ResearchRepository, StatusAssembler};

use super::{load_config, open_store};

pub async fn run(research_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let assembler = StatusAssembler::new(ResearchRepository::new(store));

    match assembler.status(research_id).await {
        Ok(view) => {
            super::run::print_view(&view);
            Ok(())
        }
        Err(PipelineError::NotFound(id)) => {
            println!("⚠️  No research with id {id} in the {} store", config.store.backend);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
