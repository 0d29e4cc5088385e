//! Memoria RPC server
//!
//! Serves the tool catalog over line-delimited JSON-RPC on stdin/stdout.
//! Logs go to stderr so the protocol channel stays clean.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use memoria::cache::TieredCache;
use memoria::compress::CompressionEngine;
use memoria::embedding::EmbeddingProvider;
use memoria::engine::MemoryEngine;
use memoria::error::{MemoriaError, Result};
use memoria::graph::{Algorithm, GraphExplorer, TraversalOptions, MAX_TRAVERSAL_DEPTH, MAX_TRAVERSAL_NODES};
use memoria::jobs::{spawn_workers, JobDispatcher, JobsConfig, WorkerContext};
use memoria::lifecycle::{DecayConfig, LifecycleEngine};
use memoria::rpc::{
    get_tool_definitions, methods, InitializeResult, RpcHandler, RpcRequest, RpcResponse,
    RpcServer, ToolCallResult, METHOD_NOT_FOUND, RESOURCES,
};
use memoria::storage::Storage;
use memoria::types::*;

#[derive(Parser, Debug)]
#[command(name = "memoria-server")]
#[command(about = "Memoria semantic memory server")]
struct Args {
    /// Database path
    #[arg(
        long,
        env = "MEMORIA_DB_PATH",
        default_value = "~/.local/share/memoria/memories.db"
    )]
    db_path: String,

    /// Remote cache URL (requires a remote cache driver)
    #[arg(long, env = "MEMORIA_CACHE_URL")]
    cache_url: Option<String>,

    /// Embedding model id
    #[arg(long, env = "MEMORIA_EMBEDDING_MODEL", default_value = "hash-v1")]
    embedding_model: String,

    /// Expected embedding dimension
    #[arg(long, env = "MEMORIA_EMBEDDING_DIMENSIONS", default_value = "384")]
    embedding_dimensions: usize,

    /// Default cache TTL in seconds
    #[arg(long, env = "MEMORIA_DEFAULT_CACHE_TTL", default_value = "3600")]
    default_cache_ttl: u64,

    /// Long cache TTL (embeddings) in seconds
    #[arg(long, env = "MEMORIA_LONG_CACHE_TTL", default_value = "86400")]
    long_cache_ttl: u64,

    /// Defer embeddings to the background job system
    #[arg(
        long,
        env = "MEMORIA_ENABLE_ASYNC_PROCESSING",
        action = clap::ArgAction::Set,
        default_value_t = true
    )]
    enable_async_processing: bool,

    /// Allow consolidation/clustering operations
    #[arg(
        long,
        env = "MEMORIA_ENABLE_CLUSTERING",
        action = clap::ArgAction::Set,
        default_value_t = true
    )]
    enable_clustering: bool,

    /// Enable the periodic decay schedule
    #[arg(
        long,
        env = "MEMORIA_DECAY_ENABLED",
        action = clap::ArgAction::Set,
        default_value_t = true
    )]
    decay_enabled: bool,

    /// Seconds between decay sweeps
    #[arg(long, env = "MEMORIA_DECAY_INTERVAL", default_value = "3600")]
    decay_interval: u64,

    /// Memories per decay batch
    #[arg(long, env = "MEMORIA_DECAY_BATCH_SIZE", default_value = "100")]
    decay_batch_size: usize,

    /// Base decay rate per day
    #[arg(long, env = "MEMORIA_BASE_DECAY_RATE", default_value = "0.01")]
    base_decay_rate: f64,

    /// Access boost weight in the decay score
    #[arg(long, env = "MEMORIA_ACCESS_BOOST", default_value = "0.1")]
    access_boost: f64,

    /// Relationship boost weight (0 disables it)
    #[arg(long, env = "MEMORIA_RELATIONSHIP_BOOST", default_value = "0.05")]
    relationship_boost: f64,

    /// Days before tombstoned expired memories are hard-deleted
    #[arg(long, env = "MEMORIA_RETENTION_DAYS", default_value = "30")]
    retention_days: i64,

    /// Traversals allowed per user per minute (0 = unlimited)
    #[arg(long, env = "MEMORIA_TRAVERSAL_RATE_LIMIT", default_value = "100")]
    traversal_rate_limit: u32,
}

/// RPC request handler wired to the engine
struct MemoriaHandler {
    engine: Arc<MemoryEngine>,
    lifecycle: Arc<LifecycleEngine>,
    explorer: GraphExplorer,
    cache: Arc<TieredCache>,
    dispatcher: JobDispatcher,
}

impl RpcHandler for MemoriaHandler {
    fn handle_request(&self, request: RpcRequest) -> RpcResponse {
        match request.method.as_str() {
            methods::INITIALIZE => RpcResponse::success(
                request.id,
                serde_json::to_value(InitializeResult::default()).unwrap_or_default(),
            ),
            methods::LIST_TOOLS => RpcResponse::success(
                request.id,
                json!({ "tools": get_tool_definitions() }),
            ),
            methods::CALL_TOOL => {
                let name = request
                    .params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let arguments = request
                    .params
                    .get("arguments")
                    .cloned()
                    .unwrap_or(Value::Object(Default::default()));
                match self.handle_tool_call(&name, arguments) {
                    Ok(value) => RpcResponse::success(
                        request.id,
                        serde_json::to_value(ToolCallResult::json(&value)).unwrap_or_default(),
                    ),
                    Err(MemoriaError::Internal(msg)) => {
                        tracing::error!(tool = name, error = %msg, "internal tool error");
                        RpcResponse::error(request.id, -32000, "Internal error".to_string())
                    }
                    Err(e) => RpcResponse::from_error(request.id, e),
                }
            }
            methods::LIST_RESOURCES => {
                let resources: Vec<Value> = RESOURCES
                    .iter()
                    .map(|(uri, description)| {
                        json!({
                            "uri": uri,
                            "name": uri.trim_start_matches("memoria://"),
                            "description": description,
                            "mimeType": "application/json",
                        })
                    })
                    .collect();
                RpcResponse::success(request.id, json!({ "resources": resources }))
            }
            methods::READ_RESOURCE => {
                let uri = request
                    .params
                    .get("uri")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                match self.read_resource(&uri) {
                    Ok(value) => RpcResponse::success(
                        request.id,
                        json!({
                            "contents": [{
                                "uri": uri,
                                "mimeType": "application/json",
                                "text": serde_json::to_string_pretty(&value).unwrap_or_default(),
                            }]
                        }),
                    ),
                    Err(e) => RpcResponse::from_error(request.id, e),
                }
            }
            other => RpcResponse::error(
                request.id,
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        }
    }
}

impl MemoriaHandler {
    fn handle_tool_call(&self, name: &str, params: Value) -> Result<Value> {
        match name {
            "memory_store" => {
                let input: StoreInput = parse_params(params)?;
                let memory = self.engine.store(&input, true)?;
                Ok(serde_json::to_value(memory)?)
            }
            "memory_search" => {
                let mut input: SearchInput = parse_params(params)?;
                input.query = sanitize_text(&input.query);
                let results = self.engine.search(&input)?;
                let count = results.len();
                Ok(json!({ "results": results, "count": count }))
            }
            "memory_list" => {
                let input: ListInput = parse_params(params)?;
                let results = self.engine.list(&input)?;
                let count = results.len();
                Ok(json!({ "results": results, "count": count }))
            }
            "memory_update" => {
                let input: UpdateInput = parse_params(params)?;
                require_uuid("id", &input.id)?;
                let memory = self.engine.update(&input)?;
                Ok(serde_json::to_value(memory)?)
            }
            "memory_delete" => {
                let input: DeleteInput = parse_params(params)?;
                let deleted = self.engine.delete(&input)?;
                Ok(json!({ "success": deleted }))
            }
            "memory_batch" => {
                let input: BatchStoreInput = parse_params(params)?;
                let report = self.engine.batch_store(&input)?;
                Ok(serde_json::to_value(report)?)
            }
            "memory_batch_delete" => {
                let input: BatchDeleteInput = parse_params(params)?;
                let report = self.engine.batch_delete(&input)?;
                Ok(serde_json::to_value(report)?)
            }
            // Accepted both as graph-expanded search and, for backward
            // compatibility, as a traversal when start_memory_id is given
            "memory_graph_search" => {
                if params.get("start_memory_id").is_some() {
                    return self.tool_traverse(params);
                }
                let mut input: GraphSearchInput = parse_params(params)?;
                input.search.query = sanitize_text(&input.search.query);
                let results = self.engine.graph_search(&input)?;
                let count = results.len();
                Ok(json!({ "results": results, "count": count }))
            }
            "memory_consolidate" => {
                let input: ConsolidateInput = parse_params(params)?;
                let report = self.engine.consolidate(&input)?;
                Ok(serde_json::to_value(report)?)
            }
            "memory_stats" => {
                let ctx = params.get("user_context").and_then(|v| v.as_str());
                self.stats_payload(ctx)
            }
            "memory_relate" => {
                let input: RelateInput = parse_params(params)?;
                let relation = self.engine.create_relation(&input)?;
                Ok(serde_json::to_value(relation)?)
            }
            "memory_unrelate" => {
                let input: UnrelateInput = parse_params(params)?;
                let deleted = self.engine.delete_relation(&input)?;
                Ok(json!({ "success": deleted }))
            }
            "memory_get_relations" => {
                let memory_id = require_str(&params, "memory_id")?;
                let ctx = normalize_user_context(
                    params.get("user_context").and_then(|v| v.as_str()),
                )?;
                let relations = self.engine.get_memory_relations(&ctx, &memory_id)?;
                Ok(json!({ "relations": relations }))
            }
            "memory_traverse" => self.tool_traverse(params),
            "memory_decay_status" => {
                let memory_id = require_str(&params, "memory_id")?;
                let ctx = normalize_user_context(
                    params.get("user_context").and_then(|v| v.as_str()),
                )?;
                let status = self.lifecycle.decay_status(&ctx, &memory_id)?;
                Ok(serde_json::to_value(status)?)
            }
            "memory_preserve" => {
                let input: PreserveInput = parse_params(params)?;
                let ctx = normalize_user_context(input.user_context.as_deref())?;
                let memory =
                    self.lifecycle
                        .preserve_memory(&ctx, &input.memory_id, input.until)?;
                Ok(serde_json::to_value(memory)?)
            }
            "memory_graph_analysis" => {
                let memory_id = require_str(&params, "memory_id")?;
                let ctx = normalize_user_context(
                    params.get("user_context").and_then(|v| v.as_str()),
                )?;
                let analysis = self.explorer.analyze(&ctx, &memory_id)?;
                Ok(serde_json::to_value(analysis)?)
            }
            other => Err(MemoriaError::InvalidParams(format!(
                "Unknown tool: {other}"
            ))),
        }
    }

    fn tool_traverse(&self, params: Value) -> Result<Value> {
        let start = require_str(&params, "start_memory_id")?;
        let ctx = normalize_user_context(params.get("user_context").and_then(|v| v.as_str()))?;

        let mut opts = TraversalOptions::new(start, ctx);
        if let Some(algorithm) = params.get("algorithm").and_then(|v| v.as_str()) {
            opts.algorithm = match algorithm {
                "bfs" => Algorithm::Bfs,
                "dfs" => Algorithm::Dfs,
                other => {
                    return Err(MemoriaError::InvalidParams(format!(
                        "algorithm: must be 'bfs' or 'dfs', got '{other}'"
                    )))
                }
            };
        }
        if let Some(depth) = params.get("max_depth").and_then(|v| v.as_u64()) {
            if depth == 0 || depth as usize > MAX_TRAVERSAL_DEPTH {
                return Err(MemoriaError::InvalidParams(format!(
                    "max_depth: must be between 1 and {MAX_TRAVERSAL_DEPTH}"
                )));
            }
            opts.max_depth = depth as usize;
        }
        if let Some(nodes) = params.get("max_nodes").and_then(|v| v.as_u64()) {
            if nodes == 0 || nodes as usize > MAX_TRAVERSAL_NODES {
                return Err(MemoriaError::InvalidParams(format!(
                    "max_nodes: must be between 1 and {MAX_TRAVERSAL_NODES}"
                )));
            }
            opts.max_nodes = nodes as usize;
        }
        if let Some(timeout) = params.get("timeout_ms").and_then(|v| v.as_u64()) {
            opts.timeout_ms = timeout;
        }
        if let Some(types) = params.get("relation_types").and_then(|v| v.as_array()) {
            opts.relation_types = Some(
                types
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(RelationType::normalize)
                    .collect(),
            );
        }
        if let Some(types) = params.get("memory_types").and_then(|v| v.as_array()) {
            let mut parsed = Vec::new();
            for t in types.iter().filter_map(|v| v.as_str()) {
                parsed.push(t.parse::<MemoryType>().map_err(|e| {
                    MemoriaError::InvalidParams(format!("memory_types: {e}"))
                })?);
            }
            opts.memory_types = Some(parsed);
        }
        if let Some(tags) = params.get("tags").and_then(|v| v.as_array()) {
            opts.tags = Some(
                tags.iter()
                    .filter_map(|v| v.as_str())
                    .map(sanitize_tag)
                    .filter(|t| !t.is_empty())
                    .collect(),
            );
        }
        if let Some(include) = params.get("include_parent_links").and_then(|v| v.as_bool()) {
            opts.include_parent_links = include;
        }

        let outcome = self.explorer.traverse(&opts)?;
        Ok(serde_json::to_value(outcome)?)
    }

    fn stats_payload(&self, user_context: Option<&str>) -> Result<Value> {
        let stats = self.engine.stats(user_context)?;
        Ok(json!({
            "memories": stats,
            "cache": self.cache.stats(),
            "jobs": self.dispatcher.metrics().snapshot(),
        }))
    }

    fn read_resource(&self, uri: &str) -> Result<Value> {
        match uri {
            "memoria://stats" => self.stats_payload(None),
            "memoria://types" => {
                let stats = self.engine.stats(None)?;
                Ok(serde_json::to_value(stats.by_type)?)
            }
            "memoria://tags" => {
                let tags = self.engine.tag_counts(None)?;
                let out: Vec<Value> = tags
                    .into_iter()
                    .map(|(tag, count)| json!({ "tag": tag, "count": count }))
                    .collect();
                Ok(Value::Array(out))
            }
            "memoria://relationships" => {
                let counts = self.engine.storage().with_connection(|conn| {
                    memoria::storage::relation_type_counts(conn, DEFAULT_USER_CONTEXT)
                })?;
                Ok(serde_json::to_value(counts)?)
            }
            "memoria://clusters" => {
                let clusters = self.engine.clusters(None)?;
                Ok(serde_json::to_value(clusters)?)
            }
            other => Err(MemoriaError::NotFound(format!("resource {other}"))),
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| MemoriaError::InvalidParams(format!("params: {e}")))
}

fn require_str(params: &Value, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| MemoriaError::InvalidParams(format!("{key}: required")))
}

fn require_uuid(path: &str, value: &str) -> Result<()> {
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| MemoriaError::InvalidParams(format!("{path}: must be a UUID")))
}

fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/{rest}");
        }
    }
    path.to_string()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let storage = Storage::open(StorageConfig {
        db_path: expand_home(&args.db_path),
        busy_timeout_ms: 30_000,
    })?;
    tracing::info!(db_path = storage.db_path(), "storage ready");

    let cache_config = CacheConfig {
        remote_url: args.cache_url.clone(),
        default_ttl_secs: args.default_cache_ttl,
        long_ttl_secs: args.long_cache_ttl,
    };
    if cache_config.remote_url.is_some() {
        tracing::warn!("no remote cache driver in this build, running local-only");
    }
    let cache = Arc::new(TieredCache::new(&cache_config));

    let embedder = Arc::new(EmbeddingProvider::new(
        &EmbeddingConfig {
            model: args.embedding_model.clone(),
            dimensions: args.embedding_dimensions,
        },
        cache.clone(),
    )?);
    let dimension = embedder.load()?;
    tracing::info!(model = args.embedding_model, dimension, "embedding model ready");

    let compressor = CompressionEngine::default();
    let dispatcher = JobDispatcher::new();

    let engine = Arc::new(
        MemoryEngine::new(
            storage.clone(),
            embedder.clone(),
            cache.clone(),
            compressor.clone(),
            EngineConfig {
                enable_async_processing: args.enable_async_processing,
                enable_clustering: args.enable_clustering,
            },
        )
        .with_dispatcher(dispatcher.clone()),
    );

    let lifecycle = Arc::new(LifecycleEngine::new(
        storage.clone(),
        cache.clone(),
        compressor.clone(),
        DecayConfig {
            base_rate: args.base_decay_rate,
            access_boost: args.access_boost,
            relationship_boost: (args.relationship_boost > 0.0)
                .then_some(args.relationship_boost),
            retention_days: args.retention_days,
            ..DecayConfig::default()
        },
    ));

    let mut explorer = GraphExplorer::new(storage.clone());
    if args.traversal_rate_limit > 0 {
        explorer = explorer.with_rate_limit(args.traversal_rate_limit);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let worker_ctx = WorkerContext {
        storage,
        cache: cache.clone(),
        embedder,
        engine: engine.clone(),
        lifecycle: lifecycle.clone(),
        dispatcher: dispatcher.clone(),
        config: JobsConfig {
            decay_enabled: args.decay_enabled,
            decay_interval_secs: args.decay_interval,
            decay_batch_size: args.decay_batch_size,
            import_chunk_size: 10,
        },
        decay_paused: Arc::new(AtomicBool::new(false)),
    };
    let pool = {
        let _guard = runtime.enter();
        spawn_workers(worker_ctx)
    };

    // SIGINT/SIGTERM start the worker drain; the serve loop ends at EOF
    {
        let dispatcher = dispatcher.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, draining workers");
                dispatcher.close();
            }
        });
    }

    let server = RpcServer::new(MemoriaHandler {
        engine,
        lifecycle,
        explorer,
        cache,
        dispatcher,
    });

    tracing::info!(version = memoria::VERSION, "memoria server ready");
    let serve_result = server.run_stdio();

    runtime.block_on(pool.shutdown());
    serve_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria::embedding::HashEmbedder;

    fn handler() -> MemoriaHandler {
        let storage = Storage::open_in_memory().unwrap();
        let cache = Arc::new(TieredCache::new(&CacheConfig::default()));
        let embedder = Arc::new(EmbeddingProvider::with_embedder(
            Arc::new(HashEmbedder::new(64)),
            cache.clone(),
            64,
        ));
        let compressor = CompressionEngine::default();
        let engine = Arc::new(MemoryEngine::new(
            storage.clone(),
            embedder,
            cache.clone(),
            compressor.clone(),
            EngineConfig {
                enable_async_processing: false,
                enable_clustering: true,
            },
        ));
        let lifecycle = Arc::new(LifecycleEngine::new(
            storage.clone(),
            cache.clone(),
            compressor,
            DecayConfig::default(),
        ));
        MemoriaHandler {
            engine,
            lifecycle,
            explorer: GraphExplorer::new(storage),
            cache,
            dispatcher: JobDispatcher::new(),
        }
    }

    fn call(handler: &MemoriaHandler, name: &str, arguments: Value) -> RpcResponse {
        handler.handle_request(RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(1)),
            method: methods::CALL_TOOL.into(),
            params: json!({ "name": name, "arguments": arguments }),
        })
    }

    fn store_args(text: &str) -> Value {
        json!({
            "content": { "text": text },
            "type": "fact",
            "source": "test",
            "confidence": 0.9
        })
    }

    #[test]
    fn test_store_and_search_round_trip() {
        let handler = handler();
        let stored = call(&handler, "memory_store", store_args("the capital of France is Paris"));
        assert!(stored.error.is_none(), "{:?}", stored.error);

        let found = call(
            &handler,
            "memory_search",
            json!({ "query": "capital of France", "threshold": 0.1 }),
        );
        assert!(found.error.is_none());
    }

    #[test]
    fn test_validation_failure_is_invalid_params() {
        let handler = handler();
        let response = call(
            &handler,
            "memory_store",
            json!({ "content": {"text": "x"}, "type": "fact", "source": "t", "confidence": 1.5 }),
        );
        let error = response.error.unwrap();
        assert_eq!(error.code, -32602);
        assert!(error.message.contains("confidence"));
    }

    #[test]
    fn test_limit_boundary() {
        let handler = handler();
        let ok = call(
            &handler,
            "memory_search",
            json!({ "query": "anything", "limit": 100 }),
        );
        assert!(ok.error.is_none());

        let too_big = call(
            &handler,
            "memory_search",
            json!({ "query": "anything", "limit": 101 }),
        );
        assert_eq!(too_big.error.unwrap().code, -32602);
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let handler = handler();
        let response = call(&handler, "memory_teleport", json!({}));
        assert!(response.error.is_some());
    }

    #[test]
    fn test_unknown_method_is_method_not_found() {
        let handler = handler();
        let response = handler.handle_request(RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(2)),
            method: "bogus/method".into(),
            params: json!({}),
        });
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn test_embeddings_never_serialized() {
        let handler = handler();
        let response = call(&handler, "memory_store", store_args("embedding stays server side"));
        let payload = serde_json::to_string(&response).unwrap();
        assert!(!payload.contains("\"embedding\""));
    }

    #[test]
    fn test_update_requires_uuid() {
        let handler = handler();
        let response = call(
            &handler,
            "memory_update",
            json!({ "id": "not-a-uuid", "updates": { "confidence": 0.5 } }),
        );
        let error = response.error.unwrap();
        assert_eq!(error.code, -32602);
        assert!(error.message.contains("UUID"));
    }

    #[test]
    fn test_decay_status_unknown_id_is_not_found() {
        let handler = handler();
        let response = call(
            &handler,
            "memory_decay_status",
            json!({ "memory_id": "missing" }),
        );
        assert_eq!(response.error.unwrap().code, -32001);
    }

    #[test]
    fn test_graph_search_alias_accepts_traversal_args() {
        let handler = handler();
        let response = call(
            &handler,
            "memory_graph_search",
            json!({ "start_memory_id": "anything", "user_context": "default" }),
        );
        // Missing start node is an empty traversal, not an error
        assert!(response.error.is_none());
    }

    #[test]
    fn test_traverse_depth_cap() {
        let handler = handler();
        let response = call(
            &handler,
            "memory_traverse",
            json!({ "start_memory_id": "x", "user_context": "default", "max_depth": 6 }),
        );
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[test]
    fn test_resources_read() {
        let handler = handler();
        let response = handler.handle_request(RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(3)),
            method: methods::READ_RESOURCE.into(),
            params: json!({ "uri": "memoria://stats" }),
        });
        assert!(response.error.is_none());

        let missing = handler.handle_request(RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(4)),
            method: methods::READ_RESOURCE.into(),
            params: json!({ "uri": "memoria://nope" }),
        });
        assert!(missing.error.is_some());
    }
}
