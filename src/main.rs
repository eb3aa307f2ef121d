use anyhow::Context;
use kgstore::{
    BulkLoader, EntityId, ExternalGraph, Id, KgAdapter, KgStorage, LabelRegistry, RelationId,
    StoreConfig, Structure, TripleStore,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("KgStore v{}", kgstore::version());
    println!("==========================================");
    println!();

    let config = StoreConfig::from_env().context("loading store configuration")?;
    let storage = KgStorage::open(config).context("opening store")?;

    match std::env::var_os("KGSTORE_IMPORT_DIR") {
        Some(dir) => import_graph(&storage, &dir)?,
        None => demo_triples(&storage)?,
    }

    report_counts(&storage)?;
    storage.flush()?;
    Ok(())
}

fn import_graph(storage: &KgStorage, dir: &std::ffi::OsStr) -> anyhow::Result<()> {
    println!("=== Importing external graph from {:?} ===", dir);
    let graph = ExternalGraph::from_dir(dir).context("reading external graph")?;

    let mut conn = storage.connect()?;
    let summaries = BulkLoader::new(&mut conn)
        .fill_from_external_graph(&graph)
        .context("loading external graph")?;
    for summary in &summaries {
        println!(
            "✓ {}: {} keys, {} entries",
            summary.structure, summary.rows, summary.entries
        );
    }
    conn.close(false)?;
    Ok(())
}

fn demo_triples(storage: &KgStorage) -> anyhow::Result<()> {
    println!("=== Demo: Triples ===");
    let paris = EntityId::parse("Q90")?;
    let france = EntityId::parse("Q142")?;
    let country = RelationId::parse("P17")?;

    storage.transact(|conn| -> kgstore::KgResult<()> {
        let labels = LabelRegistry::new(conn);
        labels.add_label(&Id::from(&paris), Some("Paris"))?;
        labels.add_label(&Id::from(&france), Some("France"))?;
        labels.add_label(&Id::from(&country), Some("country"))?;
        TripleStore::new(conn).add_triple(&paris, &country, &[france.clone()], true)
    })?;
    println!("✓ Added (Paris) -[country]-> (France)");

    let mut conn = storage.connect()?;
    let adapter = KgAdapter::attach(&conn)?;
    if let Some(id) = adapter.labels().inverse("Paris")? {
        let row = adapter.triples().subject().row(id.as_str())?;
        for (relation, objects) in &row {
            println!("  {} -{}-> {:?}", id, relation, objects.as_slice());
        }
    }
    // persist the inverse index the adapter may have built
    conn.commit()?;
    println!();
    Ok(())
}

fn report_counts(storage: &KgStorage) -> anyhow::Result<()> {
    let conn = storage.connect()?;
    for structure in Structure::ALL {
        info!("{}: {} entries", structure, conn.count(structure)?);
    }
    Ok(())
}
