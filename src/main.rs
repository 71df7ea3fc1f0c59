use std::{
    collections::HashSet,
    fs,
    io::{self, Write},
    path::Path,
    process,
};

use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use url::Url;
use xforms_server::{
    cache::{CacheConfig, CacheKey, configure_object_cache},
    config::{self, Command, DiffArgs, Settings, TransformArgs},
    controls::{Control, ItemsInfo, StaticState},
    diff::DiffOptions,
    error::AppError,
    infra::{error::InfraError, telemetry},
    response::AjaxResponse,
    transform::{
        EngineAttributes, FileResolver, KeyValidity, ResourceResolver, StylesheetInput,
        TemplatesCache, TransformError, TransformExecutor, engine_by_name,
    },
    xml::XmlWriter,
};

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let messages = error.messages();
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?messages, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?messages, "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Diff(args) => run_diff(&settings, &args),
        Command::Transform(args) => run_transform(&settings, &args),
    }
}

fn run_diff(settings: &Settings, args: &DiffArgs) -> Result<(), AppError> {
    let previous = args.previous.as_deref().map(read_controls).transpose()?;
    let current = read_controls(&args.current)?;
    let changed: HashSet<String> = args.changed.iter().cloned().collect();

    let static_state = args
        .static_itemsets
        .iter()
        .fold(StaticState::new(), |state, id| {
            state.with_items_info(
                id.as_str(),
                ItemsInfo {
                    has_non_static_item: false,
                },
            )
        });

    let mut response = AjaxResponse::new(
        &static_state,
        DiffOptions::from(&settings.ajax),
        previous.as_deref(),
        &current,
    )
    .dirty(!args.clean);
    if !changed.is_empty() {
        response = response.with_value_changes(&changed);
    }

    let mut writer = XmlWriter::new();
    let summary = response.write(&mut writer)?;
    info!(
        target = "xforms_server::diff",
        updates = summary.control_updates,
        repeat_indexes = summary.repeat_indexes,
        itemsets = summary.itemsets,
        "Wrote Ajax response"
    );
    print_document(&writer.finish())
}

fn read_controls(path: &Path) -> Result<Vec<Control>, AppError> {
    let text = fs::read_to_string(path).map_err(InfraError::from)?;
    serde_json::from_str(&text)
        .map_err(|err| InfraError::input(path.display().to_string(), err.to_string()).into())
}

fn run_transform(settings: &Settings, args: &TransformArgs) -> Result<(), AppError> {
    let engine = engine_by_name(&settings.transform.engine).ok_or_else(|| {
        AppError::validation(format!("unknown engine `{}`", settings.transform.engine))
    })?;
    let store = configure_object_cache(&CacheConfig::from(&settings.cache));
    let resolver = FileResolver;
    let attributes: EngineAttributes = args.attributes.iter().cloned().collect();

    let stylesheet_url = file_url(&args.stylesheet)?;
    let input_url = file_url(&args.input)?;
    let input = resolver.open(&input_url)?;

    for run in 1..=args.repeat {
        // The stylesheet is re-read each run so edits between runs are seen.
        let source = resolver.open(&stylesheet_url)?;
        let key_validity = resolver
            .validity(&stylesheet_url)?
            .map(|validity| KeyValidity::new(CacheKey::url(stylesheet_url.as_str()), validity));
        if key_validity.is_none() {
            warn!(url = %stylesheet_url, "Stylesheet has no validity, compiling without cache");
        }
        let templates = TemplatesCache::new(store.as_ref(), &resolver).get_or_compile(
            engine.as_ref(),
            &attributes,
            &StylesheetInput {
                source: &source,
                key_validity,
            },
        )?;

        let executor = args.outputs.iter().fold(
            TransformExecutor::new(&templates, &attributes)
                .with_location_mode(settings.transform.location_mode),
            |executor, name| executor.request_output(name.as_str()),
        );
        let mut writer = XmlWriter::new();
        let result = executor.read_primary(&input, &mut writer)?;
        for location in &result.error_locations {
            warn!(location = %location, "Stylesheet reported an error");
        }
        info!(
            target = "xforms_server::transform",
            run,
            cached_entries = store.len(),
            "Transform finished"
        );
        print_document(&writer.finish())?;

        for name in &args.outputs {
            let mut writer = XmlWriter::new();
            result.read_named(name, &mut writer)?;
            print_document(&format!("<!-- {name} -->\n{}", writer.finish()))?;
        }
    }
    Ok(())
}

fn file_url(path: &Path) -> Result<Url, AppError> {
    let absolute = fs::canonicalize(path).map_err(InfraError::from)?;
    Url::from_file_path(&absolute).map_err(|()| {
        AppError::from(TransformError::Resource {
            url: absolute.display().to_string(),
            message: "cannot be expressed as a file URL".to_string(),
        })
    })
}

fn print_document(text: &str) -> Result<(), AppError> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{text}").map_err(InfraError::from)?;
    Ok(())
}
