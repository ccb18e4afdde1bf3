use ragserve::answer::AnswerAssembler;
use ragserve::api;
use ragserve::config::Config;
use ragserve::convert::OfficeConverter;
use ragserve::embedding::build_embedding_client;
use ragserve::generation::OllamaGenerationClient;
use ragserve::ingest::{IngestPipeline, IngestQueue, spawn_worker};
use ragserve::lock::InProcessLocks;
use ragserve::logging;
use ragserve::partition::{HttpPartitioner, PartitionOptions};
use ragserve::qa::QaService;
use ragserve::retrieve::Retriever;
use ragserve::store::{ChunkStore, DocumentStore, PgStore};
use ragserve::summarize::Summarizer;
use ragserve::vector::{SummaryIndex, VectorIndexer};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("Failed to load configuration");
    let _log_guard = logging::init_tracing(config.log_file.as_deref())
        .expect("Failed to initialize logging");

    let store = Arc::new(
        PgStore::connect(&config.database_url)
            .await
            .expect("Failed to connect to the database"),
    );
    let chunks = Arc::clone(&store) as Arc<dyn ChunkStore>;
    let documents = Arc::clone(&store) as Arc<dyn DocumentStore>;

    let locks = Arc::new(InProcessLocks::new(config.lock_ttl));
    let index = Arc::new(
        SummaryIndex::new(&config.vector_url, config.vector_api_key.clone())
            .expect("Failed to initialize the summary index client"),
    );
    let embedder: Arc<dyn ragserve::embedding::EmbeddingClient + Send + Sync> =
        Arc::from(build_embedding_client(&config));
    let generator = Arc::new(
        OllamaGenerationClient::new(config.generation_url.clone(), config.generation_model.clone())
            .expect("Failed to initialize the generation client"),
    );
    let partitioner = Arc::new(
        HttpPartitioner::new(
            config.partitioner_url.clone(),
            PartitionOptions::from_config(&config),
        )
        .expect("Failed to initialize the partitioner client"),
    );

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::clone(&locks) as Arc<dyn ragserve::lock::LockService>,
        Arc::clone(&documents),
        Arc::clone(&chunks),
        partitioner,
        Summarizer::new(
            Arc::clone(&generator) as Arc<dyn ragserve::generation::GenerationClient>,
            config.summary_concurrency,
        ),
        VectorIndexer::new(
            Arc::clone(&index),
            Arc::clone(&embedder),
            config.embedding_dimension,
        ),
    ));

    let (queue, receiver) = IngestQueue::new();
    spawn_worker(queue.clone(), receiver, pipeline);

    let retriever = Retriever::new(
        Arc::clone(&index),
        Arc::clone(&embedder),
        Arc::clone(&chunks),
        config.retrieval_top_k,
        config.score_threshold,
    );
    let service = Arc::new(QaService::new(
        chunks,
        documents,
        locks,
        queue,
        retriever,
        AnswerAssembler::new(generator),
        Arc::new(OfficeConverter::new()),
    ));

    let app = api::create_router(service);
    let (listener, port) = bind_listener(config.server_port)
        .await
        .expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.unwrap();
}

async fn bind_listener(configured_port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = configured_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4200..=4299;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4200-4299",
    ))
}
