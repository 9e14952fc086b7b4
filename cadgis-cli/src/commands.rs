use anyhow::{bail, Context, Result};
use cadgis::config::{PostgisSettings, Settings, SettingsStore};
use cadgis::import::{
    import_relational, import_service, refresh, BatchReport, ImportOptions, ImportSummary,
};
use cadgis::ledger::LayerMeta;
use cadgis::source::arcgis::ArcGisClient;
use cadgis::source::postgis::{
    Condition, ConnectionParams, Extent, PostgisConnections, PostgisSource, SourceDescriptor,
    TableQuery,
};
use cadgis::surface::{Drawing, DrawingSurface};
use cadgis::symbol::{SymbolChoice, SymbolLibrary};
use cadgis_types::crs::CrsRegistry;

use crate::{Cli, Command, DrawingArgs, LedgerCommand, SymbolArgs, TableArgs};

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let store = SettingsStore::locate(cli.config_dir)?;
    let mut settings = store.load()?;
    log::debug!("Settings directory {:?}", store.dir());

    match cli.command {
        Command::Login(args) => {
            settings.arcgis.username = Some(args.username);
            settings.arcgis.password = Some(args.password);
            if let Some(portal) = args.portal {
                settings.arcgis.portal_url = portal.trim_end_matches('/').to_string();
            }
            if let Some(referer) = args.referer {
                settings.arcgis.referer = referer;
            }

            arcgis_client(&settings).await?;
            store.save(&settings)?;
            println!("Credentials saved to {:?}", store.settings_path());
        }
        Command::PgLogin(args) => {
            settings.postgis = PostgisSettings {
                host: args.host,
                port: args.port,
                database: args.database,
                username: args.username,
                password: args.password,
            };

            let tables = postgis_source(&settings).await?.tables().await?;
            store.save(&settings)?;
            println!("Connected, {} tables with geometry", tables.len());
        }
        Command::Folders => {
            let client = arcgis_client(&settings).await?;
            for folder in client.folders().await? {
                println!("{}\t{}", folder.id, folder.title);
            }
        }
        Command::Services { folder } => {
            let client = arcgis_client(&settings).await?;
            for item in client.feature_services(&folder).await? {
                println!("{}\t{}", item.id, item.title);
            }
        }
        Command::ImportService {
            item,
            layer_prefix,
            drawing,
            symbol,
        } => {
            let client = arcgis_client(&settings).await?;
            let (mut doc, target_epsg) = open_drawing(&drawing, &settings)?;
            let options = ImportOptions {
                layer_name: layer_prefix,
                symbol: symbol_choice(symbol),
                ..ImportOptions::new(target_epsg)
            };

            let report = import_service(
                &mut doc,
                &CrsRegistry::with_builtin(),
                &mut SymbolLibrary::new(),
                &client,
                &item,
                &options,
            )
            .await?;

            doc.save()?;
            print_report(&report)?;
        }
        Command::PgTables => {
            for table in postgis_source(&settings).await?.tables().await? {
                println!(
                    "{}\t{}\t{}\tEPSG:{}",
                    table.display_name(),
                    table.geom_column,
                    table.geom_type,
                    table.srid
                );
            }
        }
        Command::PgColumns { table, values } => {
            let source = postgis_source(&settings).await?;
            let table = source.find_table(&table).await?;
            for column in source.columns(&table).await? {
                println!("{}\t{}", column.name, column.data_type);
            }

            if let Some(column) = values {
                println!();
                for value in source.distinct_values(&table, &column).await? {
                    println!("{value}");
                }
            }
        }
        Command::PgImport {
            target,
            drawing,
            symbol,
        } => {
            let params = ConnectionParams::from_settings(&settings.postgis)?;
            let source = PostgisSource::connect(&params).await?;
            let table = source.find_table(&target.table).await?;
            let descriptor = SourceDescriptor::for_table(&params, &table);

            let summary =
                import_table(&settings, &store, &source, &descriptor, target, drawing, symbol)
                    .await?;
            print_summary(&summary);
        }
        Command::PgQueryImport {
            target,
            fields,
            conditions,
            extent,
            sql,
            drawing,
            symbol,
        } => {
            let params = ConnectionParams::from_settings(&settings.postgis)?;
            let source = PostgisSource::connect(&params).await?;
            let table = source.find_table(&target.table).await?;

            let sql = match sql {
                Some(sql) => sql,
                None => {
                    let mut query = TableQuery::new(table.clone(), source.columns(&table).await?);
                    if !fields.is_empty() {
                        query = query.fields(fields);
                    }
                    for condition in &conditions {
                        query = query.condition(condition.parse::<Condition>()?);
                    }
                    if let Some(extent) = extent {
                        let target_epsg = drawing.target_epsg.unwrap_or(settings.target_epsg);
                        let transform =
                            CrsRegistry::with_builtin().transform(target_epsg, table.srid)?;
                        query = query.extent(extent.parse::<Extent>()?.transformed(&transform)?);
                    }
                    query.to_sql()?
                }
            };
            log::debug!("Import query: {sql}");

            let descriptor = SourceDescriptor::for_table(&params, &table).with_sql(sql);
            let summary =
                import_table(&settings, &store, &source, &descriptor, target, drawing, symbol)
                    .await?;
            print_summary(&summary);
        }
        Command::Refresh { layer, drawing } => {
            let (mut doc, target_epsg) = open_drawing(&drawing, &settings)?;
            let source = PostgisConnections::new(settings.postgis.clone());

            let report = refresh(
                &mut doc,
                &CrsRegistry::with_builtin(),
                &source,
                &store.ledger(),
                target_epsg,
                &layer,
            )
            .await?;

            doc.save()?;
            print_report(&report)?;
        }
        Command::Ledger { command } => ledger(&store, command)?,
    }

    Ok(())
}

async fn import_table(
    settings: &Settings,
    store: &SettingsStore,
    source: &PostgisSource,
    descriptor: &SourceDescriptor,
    target: TableArgs,
    drawing: DrawingArgs,
    symbol: SymbolArgs,
) -> Result<ImportSummary> {
    let (mut doc, target_epsg) = open_drawing(&drawing, settings)?;
    let options = ImportOptions {
        layer_name: target.layer,
        split_by: target.split_by,
        symbol: symbol_choice(symbol),
        ..ImportOptions::new(target_epsg)
    };

    let summary = import_relational(
        &mut doc,
        &CrsRegistry::with_builtin(),
        &mut SymbolLibrary::new(),
        source,
        descriptor,
        &options,
        &store.ledger(),
    )
    .await?;

    doc.save()?;
    Ok(summary)
}

fn ledger(store: &SettingsStore, command: LedgerCommand) -> Result<()> {
    let ledger = store.ledger();
    match command {
        LedgerCommand::List { drawing } => {
            let records = ledger.load()?;
            let document = drawing.map(|path| path.display().to_string());
            for meta in records
                .list()
                .iter()
                .filter(|meta| document.is_none() || meta.belongs_to(document.as_deref()))
            {
                println!("{}", describe(meta));
            }
        }
        LedgerCommand::Remove { layer } => {
            if ledger.update(|l| l.remove(&layer))?.is_none() {
                bail!("layer '{layer}' is not recorded");
            }
            println!("Removed '{layer}'");
        }
        LedgerCommand::Prune { open } => {
            let open: Vec<String> = open.iter().map(|p| p.display().to_string()).collect();
            let removed = ledger.update(|l| l.prune(&open))?;
            println!("Removed {removed} records");
        }
    }

    Ok(())
}

fn describe(meta: &LayerMeta) -> String {
    let value = |v: &Option<String>| v.clone().unwrap_or_default();
    format!(
        "{}\t{}.{}\t{}\t{}",
        meta.acad_layer,
        value(&meta.schema),
        value(&meta.table),
        value(&meta.dwg_file),
        meta.last_imported
            .map(|time| time.to_rfc3339())
            .unwrap_or_default()
    )
}

fn open_drawing(args: &DrawingArgs, settings: &Settings) -> Result<(Drawing, i32)> {
    let drawing = Drawing::open(&args.drawing)
        .with_context(|| format!("cannot open drawing {:?}", args.drawing))?;
    log::debug!("Drawing {:?}", drawing.document_id());
    Ok((drawing, args.target_epsg.unwrap_or(settings.target_epsg)))
}

fn symbol_choice(args: SymbolArgs) -> SymbolChoice {
    match args.symbol {
        Some(symbol) => SymbolChoice::Use {
            symbol,
            label_attribute: args.label,
        },
        None => SymbolChoice::Decline,
    }
}

async fn arcgis_client(settings: &Settings) -> Result<ArcGisClient> {
    let mut client = ArcGisClient::new(settings.arcgis.clone())?;
    client.login().await?;
    Ok(client)
}

async fn postgis_source(settings: &Settings) -> Result<PostgisSource> {
    let params = ConnectionParams::from_settings(&settings.postgis)?;
    Ok(PostgisSource::connect(&params).await?)
}

fn print_summary(summary: &ImportSummary) {
    for layer in &summary.layers {
        println!("{}: {}", layer.layer, layer.stats);
    }
    if summary.layers.is_empty() {
        println!("Nothing to import");
    }
}

fn print_report(report: &BatchReport) -> Result<()> {
    for layer in &report.layers {
        println!("{}: {}", layer.layer, layer.stats);
    }
    for err in &report.failed {
        eprintln!("{err}");
    }

    if !report.is_success() {
        bail!("{} layers failed", report.failed.len());
    }
    Ok(())
}
