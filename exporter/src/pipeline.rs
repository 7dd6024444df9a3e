use crate::batching::Batcher;
use crate::config::{self, ConfigSources, Settings};
use crate::credentials;
use crate::db::InfluxClient;
use crate::errors::Result;
use crate::mapper;
use crate::netatmo::Session;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub stations: usize,
    pub modules: usize,
    pub modules_skipped: usize,
    pub points: usize,
}

/// Opens a Netatmo session and persists its token when it changed. The
/// returned settings carry the token in use.
pub async fn authenticate(
    sources: &ConfigSources,
    mut settings: Settings,
    now: i64,
) -> Result<(Session, Settings)> {
    let session = Session::authenticate(&settings.netatmo, now).await?;
    settings.netatmo = credentials::persist_token(&sources.netatmo, settings.netatmo, session.token())?;
    Ok((session, settings))
}

/// One full pass: load config, authenticate, fetch, map and write.
pub async fn run<E>(sources: &ConfigSources, env: E, now: i64) -> Result<SyncSummary>
where
    E: Fn(&str) -> Option<String>,
{
    let settings = config::load(sources, env)?;
    let client = InfluxClient::new(&settings.influx)?;
    let (session, settings) = authenticate(sources, settings, now).await?;

    let stations = session.read().await?;
    info!("Fetched {} stations", stations.len());

    let mut batcher = Batcher::new(client, settings.influx.batch_size);
    let mut summary = SyncSummary::default();

    for station in &stations {
        info!("Station {}", station.name);
        let points = mapper::station_points(station);

        summary.stations += 1;
        summary.modules += station.modules.len();
        summary.modules_skipped += station
            .modules
            .iter()
            .filter(|m| m.last_measure.is_none())
            .count();
        summary.points += points.len();

        batcher.extend(points).await?;
        batcher.flush().await?;
    }

    info!(
        "Wrote {} points from {} modules ({} skipped)",
        batcher.written(),
        summary.modules,
        summary.modules_skipped
    );
    Ok(summary)
}
