mod ingest_pipeline;
mod relational_store;
