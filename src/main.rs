use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{TryRecvError, channel};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use hecs::Entity;
use itertools::Itertools;
use log::{info, trace, warn};
use scene_files::entity::reader::EntityReader;

use crate::settings::{CliArgs, Command};
use sceneloader::entity::entity_handler::{ENTITY_KIND, EntityCache, EntityResourceHandler, entity_request};
use sceneloader::entity::scene_graph::SceneGraph;
use sceneloader::entity::systems::component_system::ComponentSystemRegistry;
use sceneloader::entity::systems::model_system::ModelComponentSystem;
use sceneloader::io::common::source::DataSource;
use sceneloader::io::file::FileSource;
use sceneloader::resources::blob_handler::{BLOB_KIND, BlobResourceHandler};
use sceneloader::resources::{
    BatchCallbacks, DEFAULT_PRIORITY, FetchError, LoaderConfig, RequestOptions, ResourceKind, ResourceLoader,
    ResourceMap,
};

mod settings;

const PUMP_INTERVAL: Duration = Duration::from_millis(5);

fn main() -> anyhow::Result<()> {
    env_logger::init();

    #[cfg(feature = "tracy")]
    let _tracy = tracy_client::Client::start();

    let args = CliArgs::parse();
    trace!("Starting with args: {:?}", args);

    match &args.command {
        Command::List => list(&args.data_dir),
        Command::Load { guids } => load(&args, guids),
    }
}

fn list(data_dir: &str) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(data_dir).with_context(|| format!("Cannot read {}", data_dir))?;

    let paths = entries
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .sorted()
        .collect_vec();

    for path in paths {
        match std::fs::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|buf| Ok(EntityReader::parse_slice(&buf)?))
        {
            Ok(document) => println!(
                "{}\t{}\t{} children\t{} components",
                document.resource_id,
                document.name,
                document.children.len(),
                document.components.len()
            ),
            Err(err) => warn!("Skipping {}: {}", path.display(), err),
        }
    }
    Ok(())
}

fn load(args: &CliArgs, guids: &[String]) -> anyhow::Result<()> {
    if !Path::new(&args.data_dir).is_dir() {
        bail!("Data directory {} does not exist", args.data_dir);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let loader = ResourceLoader::new(LoaderConfig {
        max_concurrent_requests: args.max_concurrent,
        batch_timeout: args.timeout_ms.map(Duration::from_millis),
    });
    let scene = Arc::new(SceneGraph::new());

    let mut systems = ComponentSystemRegistry::new();
    systems.register(Arc::new(ModelComponentSystem::new(
        scene.clone(),
        Arc::downgrade(&loader),
    )));

    let entity_source: Arc<dyn DataSource> =
        Arc::new(FileSource::new(&args.data_dir, runtime.handle().clone()).with_extension("json"));
    let blob_source: Arc<dyn DataSource> = Arc::new(FileSource::new(&args.data_dir, runtime.handle().clone()));

    loader.register_handler(
        ResourceKind::new(ENTITY_KIND),
        Arc::new(EntityResourceHandler::new(
            scene.clone(),
            Arc::new(systems),
            Arc::new(EntityCache::new()),
            Some(entity_source),
        )),
    )?;
    loader.register_handler(
        ResourceKind::new(BLOB_KIND),
        Arc::new(BlobResourceHandler::new(blob_source)),
    )?;

    let (sender, receiver) = channel::<Result<ResourceMap, FetchError>>();
    let error_sender = sender.clone();
    let handle = loader.request(
        guids.iter().map(entity_request).collect_vec(),
        DEFAULT_PRIORITY,
        BatchCallbacks::new()
            .on_success(move |resources| {
                let _ = sender.send(Ok(resources));
            })
            .on_error(move |errors| {
                let _ = error_sender.send(Err(errors.clone()));
            })
            .on_progress(|percent| info!("Loading: {:.0}%", percent)),
        RequestOptions::default(),
    )?;

    let resources = loop {
        loader.update();
        profiling::finish_frame!();

        match receiver.try_recv() {
            Ok(result) => break result.with_context(|| format!("Failed to load batch {}", handle))?,
            Err(TryRecvError::Empty) => std::thread::sleep(PUMP_INTERVAL),
            Err(TryRecvError::Disconnected) => bail!("Batch {} was dropped before it completed", handle),
        }
    };

    for guid in guids {
        let Some(entity) = resources
            .get(guid)
            .and_then(|resource| resource.downcast_ref::<Entity>())
        else {
            warn!("{} did not resolve to an entity", guid);
            continue;
        };

        for line in scene.describe(*entity) {
            println!("{}", line);
        }
    }
    Ok(())
}
