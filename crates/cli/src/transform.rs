//! Offline runs of the transformation engine over JSON files.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value as Json};

use hb_transform_common::auction::context::{AuctionContext, ConsentSignals};
use hb_transform_common::auction::{AdUnitRequest, ExchangeResponse, Transformer};
use hb_transform_common::diagnostics::{CollectingSink, DiagnosticSink, LogSink};
use hb_transform_common::rtd::{
    AuctionSession, RequestBidsConfig, RtdModule, RtdServices, StaticFloorsFetcher,
};
use hb_transform_common::settings::Settings;
use hb_transform_common::userid::{IdStorage, MemoryIdStorage, UserIdModule};

use crate::error::CliError;

/// Load and validate a settings file. Environment overrides are applied.
pub fn load_settings(path: &Path, verbose: bool) -> Result<Settings, CliError> {
    if verbose {
        log::debug!("Loading settings from {}", path.display());
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        CliError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;

    Settings::from_toml(&contents).map_err(|e| CliError::Config(format!("{e:?}")))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| CliError::Json(format!("{}: {}", path.display(), e)))
}

fn read_optional_json<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T, CliError> {
    path.map_or_else(|| Ok(T::default()), read_json)
}

/// Diagnostics either collected into the output or forwarded to the log.
enum Diagnostics {
    Collect(CollectingSink),
    Log(LogSink),
}

impl Diagnostics {
    fn new(collect: bool) -> Self {
        if collect {
            Self::Collect(CollectingSink::new())
        } else {
            Self::Log(LogSink)
        }
    }

    fn sink(&self) -> &dyn DiagnosticSink {
        match self {
            Self::Collect(sink) => sink,
            Self::Log(sink) => sink,
        }
    }

    fn attach(self, mut output: Json) -> Result<Json, CliError> {
        if let (Self::Collect(sink), Json::Object(map)) = (self, &mut output) {
            map.insert("diagnostics".to_string(), serde_json::to_value(sink.entries())?);
        }
        Ok(output)
    }
}

/// Inputs shared by `build` and `interpret`.
pub struct BuildInputs<'a> {
    pub requests: &'a Path,
    pub context: Option<&'a Path>,
    pub diagnostics: bool,
}

/// Build wire payloads for every request addressed to a registered bidder.
pub fn build(settings: &Settings, inputs: &BuildInputs<'_>) -> Result<Json, CliError> {
    let requests: Vec<AdUnitRequest> = read_json(inputs.requests)?;
    let ctx: AuctionContext = read_optional_json(inputs.context)?;
    let transformer = Transformer::from_settings(settings);
    let diagnostics = Diagnostics::new(inputs.diagnostics);

    let payloads = transformer.build_requests(&requests, &ctx, diagnostics.sink());
    log::info!(
        "Built {} payloads from {} requests",
        payloads.len(),
        requests.len()
    );

    diagnostics.attach(json!({ "payloads": payloads }))
}

/// Rebuild the payloads and interpret `responses`, which answer them in order.
pub fn interpret(
    settings: &Settings,
    inputs: &BuildInputs<'_>,
    responses: &Path,
) -> Result<Json, CliError> {
    let requests: Vec<AdUnitRequest> = read_json(inputs.requests)?;
    let ctx: AuctionContext = read_optional_json(inputs.context)?;
    let responses: Vec<ExchangeResponse> = read_json(responses)?;
    let transformer = Transformer::from_settings(settings);
    let diagnostics = Diagnostics::new(inputs.diagnostics);

    let payloads = transformer.build_requests(&requests, &ctx, diagnostics.sink());
    if payloads.len() != responses.len() {
        return Err(CliError::Json(format!(
            "expected {} responses, one per payload, got {}",
            payloads.len(),
            responses.len()
        )));
    }

    let mut bids = Vec::new();
    let mut notifications = BTreeMap::new();
    for (payload, response) in payloads.iter().zip(&responses) {
        for bid in transformer.interpret_response(response, payload, diagnostics.sink()) {
            let pixels = transformer.win_notifications(&bid);
            if !pixels.is_empty() {
                notifications.insert(bid.request_id.clone(), pixels);
            }
            bids.push(bid);
        }
    }
    log::info!("Interpreted {} bids from {} responses", bids.len(), responses.len());

    diagnostics.attach(json!({ "bids": bids, "winNotifications": notifications }))
}

/// Inputs for the `rtd` command.
pub struct RtdInputs<'a> {
    pub request_bids: &'a Path,
    pub session: Option<&'a Path>,
    pub consent: Option<&'a Path>,
    /// Floors file body served to the floors provider instead of a fetch.
    pub floors: Option<&'a Path>,
}

/// Run every enabled RTD provider over a request configuration.
pub fn rtd(settings: &Settings, inputs: &RtdInputs<'_>) -> Result<Json, CliError> {
    let mut config: RequestBidsConfig = read_json(inputs.request_bids)?;
    let mut session: AuctionSession = read_optional_json(inputs.session)?;
    let consent: ConsentSignals = read_optional_json(inputs.consent)?;

    let mut services = RtdServices::default();
    if let Some(floors) = inputs.floors {
        services.floors_fetcher = Arc::new(StaticFloorsFetcher::new(fs::read_to_string(floors)?));
    }

    let module = RtdModule::from_settings(settings, &services);
    let outcomes = futures::executor::block_on(module.run(&mut config, &mut session, &consent));

    let outcomes: BTreeMap<&str, String> = outcomes
        .into_iter()
        .map(|(name, outcome)| (name, format!("{outcome:?}")))
        .collect();

    Ok(json!({
        "requestBids": config,
        "session": session,
        "outcomes": outcomes,
    }))
}

/// Resolve user ids against a cookie jar file (`{"name": "value"}`).
pub fn user_ids(settings: &Settings, cookies: Option<&Path>) -> Result<Json, CliError> {
    let jar: BTreeMap<String, String> = read_optional_json(cookies)?;
    let storage = MemoryIdStorage::new();
    let far_future = chrono::Utc::now() + chrono::Duration::days(1);
    for (name, value) in &jar {
        storage.set_cookie(name, value, far_future, "lax");
    }

    let module = UserIdModule::from_settings(settings);
    let (eids, pixels) = module.resolve(&storage);

    let cookies: BTreeMap<String, Json> = storage
        .snapshot()
        .into_iter()
        .map(|(name, cookie)| {
            (
                name,
                json!({
                    "value": cookie.value,
                    "expires": cookie.expires.to_rfc3339(),
                    "sameSite": cookie.same_site,
                }),
            )
        })
        .collect();

    Ok(json!({ "eids": eids, "pixels": pixels, "cookies": cookies }))
}

/// Registered integrations, by kind.
pub fn describe(settings: &Settings) -> Json {
    let transformer = Transformer::from_settings(settings);
    json!({
        "bidders": transformer.registry().codes(),
        "rtdProviders": RtdModule::from_settings(settings, &RtdServices::default()).len(),
        "userIdSubmodules": UserIdModule::from_settings(settings).len(),
    })
}
