//! TTL policies and endpoint classification.
//!
//! Each upstream endpoint + parameter combination is classified into a
//! [`DataCategory`]; the category alone determines caching behavior through
//! a fixed policy table. The table is expressed as a `match` so it is
//! immutable for the process lifetime by construction.

use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use super::keys::QueryParams;

/// Fixture statuses that mean a match is currently being played.
const LIVE_STATUSES: [&str; 7] = ["1H", "2H", "HT", "ET", "P", "LIVE", "BT"];

/// Fixture statuses that mean a match has finished; its data is immutable.
const FINISHED_STATUSES: [&str; 3] = ["FT", "AET", "PEN"];

/// Volatility classes for cached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    /// Minute-by-minute match data while play is in progress.
    LiveMatch,
    /// Fixture lists, upcoming matches, search results.
    SemiVolatile,
    /// League tables; refreshed faster while any match is live.
    Standings,
    /// Per-player season aggregates.
    PlayerSeasonStats,
    /// Per-team season aggregates.
    TeamSeasonStats,
    /// Team metadata, finished-match data; stable within a season.
    StableMetadata,
}

impl DataCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LiveMatch => "live_match",
            Self::SemiVolatile => "semi_volatile",
            Self::Standings => "standings",
            Self::PlayerSeasonStats => "player_season_stats",
            Self::TeamSeasonStats => "team_season_stats",
            Self::StableMetadata => "stable_metadata",
        }
    }

    /// Look up the TTL policy for this category.
    ///
    /// `live_window` only affects `Standings`: while any match in the
    /// competition is live the fresh TTL halves, so tables pick up goals
    /// within a minute. Stale window and SWR flag are unchanged.
    pub fn policy(self, live_window: bool) -> TtlPolicy {
        match self {
            Self::LiveMatch => TtlPolicy {
                fresh_ttl: Duration::from_secs(5),
                stale_ttl: Duration::ZERO,
                allow_swr: false,
            },
            Self::SemiVolatile => TtlPolicy {
                fresh_ttl: Duration::from_secs(45),
                stale_ttl: Duration::from_secs(30),
                allow_swr: false,
            },
            Self::Standings => TtlPolicy {
                fresh_ttl: if live_window {
                    Duration::from_secs(60)
                } else {
                    Duration::from_secs(120)
                },
                stale_ttl: Duration::from_secs(300),
                allow_swr: true,
            },
            Self::PlayerSeasonStats | Self::TeamSeasonStats => TtlPolicy {
                fresh_ttl: Duration::from_secs(900),
                stale_ttl: Duration::from_secs(1800),
                allow_swr: true,
            },
            Self::StableMetadata => TtlPolicy {
                fresh_ttl: Duration::from_secs(21600),
                stale_ttl: Duration::from_secs(64800),
                allow_swr: true,
            },
        }
    }
}

impl std::fmt::Display for DataCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TTL configuration resolved for one access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// How long data is servable without any revalidation.
    pub fresh_ttl: Duration,
    /// Additional grace window during which stale data may still be served.
    pub stale_ttl: Duration,
    /// Whether stale data may be served while a background refresh runs.
    pub allow_swr: bool,
}

/// Extra classification inputs that are not query parameters.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Short status code of the fixture the request concerns, when known
    /// (`1H`, `FT`, `NS`, ...). Matched case-insensitively.
    pub fixture_status: Option<String>,
}

impl RequestContext {
    pub fn with_fixture_status(status: impl Into<String>) -> Self {
        Self {
            fixture_status: Some(status.into()),
        }
    }
}

/// True if `status` is one of the in-play fixture statuses.
///
/// Callers also use this to derive the standings live-window flag from the
/// same status set the classifier consults.
pub fn is_live_status(status: &str) -> bool {
    let status = status.to_ascii_uppercase();
    LIVE_STATUSES.contains(&status.as_str())
}

fn is_finished_status(status: &str) -> bool {
    let status = status.to_ascii_uppercase();
    FINISHED_STATUSES.contains(&status.as_str())
}

/// Classify an endpoint + parameter combination into a [`DataCategory`].
///
/// Rules are evaluated in priority order; the first match wins.
pub fn classify(endpoint: &str, params: &QueryParams, context: &RequestContext) -> DataCategory {
    match endpoint {
        "standings" => DataCategory::Standings,

        // A single team is immutable within a season; a league listing
        // carries season-long aggregates.
        "teams" if params.contains("id") => DataCategory::StableMetadata,
        "teams" => DataCategory::TeamSeasonStats,

        "fixtures" if params.contains("id") => match_data_category(context),
        "fixtures" => DataCategory::SemiVolatile,

        "players" if params.contains("id") => DataCategory::PlayerSeasonStats,
        "players" if params.contains("search") => DataCategory::SemiVolatile,
        "players" if params.contains("team") => DataCategory::PlayerSeasonStats,
        "players" => DataCategory::SemiVolatile,

        "players/topscorers" | "players/topassists" => DataCategory::PlayerSeasonStats,
        "players/fixtures" => DataCategory::SemiVolatile,

        // Per-match detail follows the fixture's lifecycle.
        "fixtures/players" | "fixtures/events" | "fixtures/lineups" | "fixtures/statistics" => {
            match_data_category(context)
        }

        _ => DataCategory::SemiVolatile,
    }
}

/// Category for match-scoped data (events, lineups, statistics, per-match
/// player stats), decided by the fixture status: live while in play,
/// immutable once finished, semi-volatile before kickoff or when unknown.
fn match_data_category(context: &RequestContext) -> DataCategory {
    let status = context.fixture_status.as_deref().unwrap_or("");
    if is_live_status(status) {
        DataCategory::LiveMatch
    } else if is_finished_status(status) {
        DataCategory::StableMetadata
    } else {
        DataCategory::SemiVolatile
    }
}

// ============================================================================
// Lineup TTL schedule
// ============================================================================

/// TTL for lineup data, keyed on hours until kickoff.
///
/// Confirmed lineups churn less than predicted ones far out, but both need
/// tight refresh in the hour before kickoff when team news lands. Returns
/// `(fresh_ttl, stale_ttl)`.
pub fn lineup_ttl(kickoff: OffsetDateTime, confirmed: bool) -> (Duration, Duration) {
    let hours_until = (kickoff - OffsetDateTime::now_utc()).as_seconds_f64() / 3600.0;

    let fresh_secs = if hours_until >= 24.0 {
        3600
    } else if hours_until >= 1.5 {
        if confirmed { 60 } else { 300 }
    } else if hours_until >= 0.0 {
        if confirmed { 10 } else { 30 }
    } else if hours_until >= -2.0 {
        // In play: lineups only change on substitutions.
        if confirmed { 60 } else { 300 }
    } else {
        // Post-match: immutable.
        21600
    };

    // No stale serving close to kickoff.
    let stale_secs = if hours_until < 2.0 { 0 } else { fresh_secs / 2 };

    (
        Duration::from_secs(fresh_secs),
        Duration::from_secs(stale_secs),
    )
}
