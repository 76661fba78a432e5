use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::config::DelayRange;
use crate::fetcher::{fetch, FetchError, Fetched, Fetcher};
use crate::resource::{ResourceKind, Root, Route, RouteSummary, Stop, System, SystemSummary};
use crate::stats::StatsCollector;

// =============================================================================
// Walk States
// =============================================================================

/// Where one simulated client currently is in the resource hierarchy.
///
/// Each variant is consumed by exactly one call to [`Walker::transition`].
#[derive(Debug)]
pub enum WalkState {
    Start,
    System(System),
    Route(Route),
    Stop(Stop),
    End,
}

impl WalkState {
    pub fn name(&self) -> &'static str {
        match self {
            WalkState::Start => "start",
            WalkState::System(_) => "system",
            WalkState::Route(_) => "route",
            WalkState::Stop(_) => "stop",
            WalkState::End => "end",
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, WalkState::End)
    }
}

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("fetching {kind} failed: {source}")]
    Fetch {
        kind: ResourceKind,
        #[source]
        source: FetchError,
    },

    #[error("no {kind} to choose from at {url}")]
    Empty { kind: ResourceKind, url: Url },

    #[error("invalid {kind} href {href:?}: {source}")]
    InvalidHref {
        kind: ResourceKind,
        href: String,
        #[source]
        source: url::ParseError,
    },
}

// =============================================================================
// Walk Outcome
// =============================================================================

/// A random index drawn while choosing among resources of `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub kind: ResourceKind,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ending {
    Completed,
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOutcome {
    pub walker_id: usize,
    pub selections: Vec<Selection>,
    pub ending: Ending,
}

// =============================================================================
// Walker
// =============================================================================

/// Collaborators shared by every walker in a run.
pub struct WalkContext {
    pub base_url: Url,
    pub fetcher: Arc<dyn Fetcher>,
    pub stats: Arc<StatsCollector>,
    pub action_pause: DelayRange,
}

pub struct Walker {
    id: usize,
    ctx: Arc<WalkContext>,
    rng: StdRng,
    selections: Vec<Selection>,
}

impl Walker {
    pub fn new(id: usize, ctx: Arc<WalkContext>, rng: StdRng) -> Self {
        Self {
            id,
            ctx,
            rng,
            selections: Vec::new(),
        }
    }

    /// Walks from `Start` until `End`, pausing between steps.
    ///
    /// Any error ends the walk; nothing is retried.
    pub async fn run(mut self) -> WalkOutcome {
        let mut state = WalkState::Start;

        let ending = loop {
            let from = state.name();
            state = match self.transition(state).await {
                Ok(next) => next,
                Err(e) => {
                    warn!("Walker {} aborted in {} state: {}", self.id, from, e);
                    break Ending::Aborted(e.to_string());
                }
            };
            debug!("Walker {} moved {} -> {}", self.id, from, state.name());

            if state.is_end() {
                break Ending::Completed;
            }

            sleep(self.ctx.action_pause.sample(&mut self.rng)).await;
        };

        WalkOutcome {
            walker_id: self.id,
            selections: self.selections,
            ending,
        }
    }

    /// Consumes `state` and produces the next one.
    ///
    /// # Panics
    ///
    /// Panics when called with [`WalkState::End`].
    pub async fn transition(&mut self, state: WalkState) -> Result<WalkState, WalkError> {
        match state {
            WalkState::Start => self.from_start().await,
            WalkState::System(system) => self.from_system(system).await,
            WalkState::Route(route) => self.from_route(route).await,
            WalkState::Stop(_) => Ok(WalkState::End),
            WalkState::End => panic!("walker {} cannot transition out of the end state", self.id),
        }
    }

    async fn from_start(&mut self) -> Result<WalkState, WalkError> {
        let root_url = self.ctx.base_url.clone();
        let root: Root = self.get(ResourceKind::Root, &root_url).await?;

        let systems_url = self.resolve(ResourceKind::System, &root.systems.href)?;
        let systems: Vec<SystemSummary> = self.get(ResourceKind::System, &systems_url).await?;

        let index = self.choose(ResourceKind::System, systems.len(), &systems_url)?;
        let system_url = self.resolve(ResourceKind::System, &systems[index].href)?;
        let system: System = self.get(ResourceKind::System, &system_url).await?;

        Ok(WalkState::System(system))
    }

    async fn from_system(&mut self, system: System) -> Result<WalkState, WalkError> {
        let routes_url = self.resolve(ResourceKind::Route, &system.routes.href)?;
        let routes: Vec<RouteSummary> = self.get(ResourceKind::Route, &routes_url).await?;

        let index = self.choose(ResourceKind::Route, routes.len(), &routes_url)?;
        let route_url = self.resolve(ResourceKind::Route, &routes[index].href)?;
        let route: Route = self.get(ResourceKind::Route, &route_url).await?;

        Ok(WalkState::Route(route))
    }

    async fn from_route(&mut self, route: Route) -> Result<WalkState, WalkError> {
        let Some(map_index) = select_service_map(&route, &mut self.rng) else {
            debug!("Walker {} found no stops on any service map", self.id);
            return Ok(WalkState::End);
        };

        let stops = &route.service_maps[map_index].stops;
        let stop_index = self.rng.random_range(0..stops.len());
        self.selections.push(Selection {
            kind: ResourceKind::Stop,
            index: stop_index,
        });

        match self.fetch_stop(&stops[stop_index].href).await {
            Ok(fetched) => {
                self.ctx
                    .stats
                    .record(ResourceKind::Stop, fetched.elapsed)
                    .await;
                Ok(WalkState::Stop(fetched.value))
            }
            Err(e) => {
                self.ctx.stats.record_failure();
                Err(e)
            }
        }
    }

    /// Every error here, including an unresolvable href, is a failed stop request.
    async fn fetch_stop(&self, href: &str) -> Result<Fetched<Stop>, WalkError> {
        let url = self.resolve(ResourceKind::Stop, href)?;
        fetch(self.ctx.fetcher.as_ref(), &url)
            .await
            .map_err(|source| WalkError::Fetch {
                kind: ResourceKind::Stop,
                source,
            })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        kind: ResourceKind,
        url: &Url,
    ) -> Result<T, WalkError> {
        debug!("Walker {} fetching {} from {}", self.id, kind, url);
        fetch(self.ctx.fetcher.as_ref(), url)
            .await
            .map(|fetched| fetched.value)
            .map_err(|source| WalkError::Fetch { kind, source })
    }

    fn resolve(&self, kind: ResourceKind, href: &str) -> Result<Url, WalkError> {
        self.ctx
            .base_url
            .join(href)
            .map_err(|source| WalkError::InvalidHref {
                kind,
                href: href.to_string(),
                source,
            })
    }

    /// Draws a uniform index in `[0, len)`, refusing empty collections.
    fn choose(&mut self, kind: ResourceKind, len: usize, url: &Url) -> Result<usize, WalkError> {
        if len == 0 {
            return Err(WalkError::Empty {
                kind,
                url: url.clone(),
            });
        }
        let index = self.rng.random_range(0..len);
        self.selections.push(Selection { kind, index });
        Ok(index)
    }
}

/// Picks a service map that has stops.
///
/// A random map is tried first; if it is empty the first non-empty map in
/// order is used instead. Returns `None` when no map has any stops.
pub fn select_service_map<R: Rng + ?Sized>(route: &Route, rng: &mut R) -> Option<usize> {
    let maps = &route.service_maps;
    if maps.is_empty() {
        return None;
    }

    let index = rng.random_range(0..maps.len());
    if !maps[index].stops.is_empty() {
        return Some(index);
    }
    maps.iter().position(|map| !map.stops.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FixtureFetcher;
    use crate::resource::{ServiceMap, StopSummary};
    use rand::SeedableRng;
    use std::time::Duration;

    const BASE: &str = "https://demo.test/";

    const ROOT: &str = r#"{"systems": {"count": 1, "href": "https://demo.test/systems"}}"#;
    const SYSTEMS: &str = r#"[{"id": "sys", "name": "Test", "href": "https://demo.test/systems/sys"}]"#;
    const SYSTEM: &str = r#"{"routes": {"count": 1, "href": "https://demo.test/systems/sys/routes"}}"#;
    const ROUTES: &str = r#"[{"id": "R1", "href": "https://demo.test/systems/sys/routes/R1"}]"#;
    const ROUTE_URL: &str = "https://demo.test/systems/sys/routes/R1";
    const STOP_A_URL: &str = "https://demo.test/systems/sys/stops/A";
    const STOP_A: &str = r#"{"id": "A", "name": "Stop A", "stop_times": []}"#;

    fn two_map_route() -> String {
        format!(
            r#"{{"service_maps": [
                {{"group_id": "weekend", "stops": []}},
                {{"group_id": "any_time", "stops": [{{"id": "A", "name": "Stop A", "href": "{STOP_A_URL}"}}]}}
            ]}}"#
        )
    }

    fn hierarchy(route: &str) -> FixtureFetcher {
        FixtureFetcher::new()
            .with_latency(Duration::from_millis(5))
            .with_json(BASE, ROOT)
            .with_json("https://demo.test/systems", SYSTEMS)
            .with_json("https://demo.test/systems/sys", SYSTEM)
            .with_json("https://demo.test/systems/sys/routes", ROUTES)
            .with_json(ROUTE_URL, route)
    }

    fn context(fetcher: FixtureFetcher) -> (Arc<WalkContext>, Arc<StatsCollector>) {
        let stats = Arc::new(StatsCollector::new());
        let ctx = Arc::new(WalkContext {
            base_url: Url::parse(BASE).unwrap(),
            fetcher: Arc::new(fetcher),
            stats: Arc::clone(&stats),
            action_pause: DelayRange::zero(),
        });
        (ctx, stats)
    }

    fn route(stop_counts: &[usize]) -> Route {
        Route {
            service_maps: stop_counts
                .iter()
                .enumerate()
                .map(|(m, &n)| ServiceMap {
                    group_id: format!("map-{m}"),
                    stops: (0..n)
                        .map(|s| StopSummary {
                            id: format!("{m}-{s}"),
                            name: String::new(),
                            href: format!("/stops/{m}-{s}"),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_select_service_map_falls_back_to_first_non_empty() {
        let route = route(&[0, 0, 3, 2]);
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let index = select_service_map(&route, &mut rng).unwrap();
            assert!(index == 2 || index == 3, "picked empty map {index}");
        }
    }

    #[test]
    fn test_select_service_map_none_when_all_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(select_service_map(&route(&[0, 0]), &mut rng), None);
        assert_eq!(select_service_map(&route(&[]), &mut rng), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_reaches_only_non_empty_stop() {
        for seed in 0..16 {
            let fetcher = hierarchy(&two_map_route()).with_json(STOP_A_URL, STOP_A);
            let (ctx, stats) = context(fetcher);

            let outcome = Walker::new(0, ctx, StdRng::seed_from_u64(seed)).run().await;

            assert_eq!(outcome.ending, Ending::Completed);
            assert_eq!(stats.samples(ResourceKind::Stop).await.len(), 1);
            assert_eq!(stats.failures(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_without_stops_ends_cleanly() {
        let route = r#"{"service_maps": [{"group_id": "a", "stops": []}, {"group_id": "b", "stops": []}]}"#;
        let (ctx, stats) = context(hierarchy(route));

        let outcome = Walker::new(0, ctx, StdRng::seed_from_u64(3)).run().await;

        assert_eq!(outcome.ending, Ending::Completed);
        assert!(stats.samples(ResourceKind::Stop).await.is_empty());
        assert_eq!(stats.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_failure_counts_once_and_ends() {
        let fetcher = hierarchy(&two_map_route()).with_status(STOP_A_URL, 500);
        let (ctx, stats) = context(fetcher);

        let outcome = Walker::new(0, ctx, StdRng::seed_from_u64(9)).run().await;

        assert!(matches!(outcome.ending, Ending::Aborted(_)));
        assert_eq!(stats.failures(), 1);
        assert!(stats.samples(ResourceKind::Stop).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_with_partial_trips_is_recorded() {
        let fetcher = hierarchy(&two_map_route()).with_json(
            STOP_A_URL,
            r#"{"id": "A", "name": "A", "stop_times": [{"trip": {"id": "T1"}}]}"#,
        );
        let (ctx, stats) = context(fetcher);

        let outcome = Walker::new(0, ctx, StdRng::seed_from_u64(4)).run().await;

        assert_eq!(outcome.ending, Ending::Completed);
        assert_eq!(stats.samples(ResourceKind::Stop).await.len(), 1);
        assert_eq!(stats.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolvable_stop_href_counts_as_failure() {
        let route = r#"{"service_maps": [{"stops": [{"id": "A", "href": "http://[oops/stops/A"}]}]}"#;
        let (ctx, stats) = context(hierarchy(route));

        let outcome = Walker::new(0, ctx, StdRng::seed_from_u64(2)).run().await;

        match outcome.ending {
            Ending::Aborted(reason) => assert!(reason.contains("invalid stop href"), "{reason}"),
            other => panic!("expected abort, got {:?}", other),
        }
        assert_eq!(stats.failures(), 1);
        assert!(stats.samples(ResourceKind::Stop).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_system_list_aborts_walk() {
        let fetcher = FixtureFetcher::new()
            .with_json(BASE, ROOT)
            .with_json("https://demo.test/systems", "[]");
        let (ctx, stats) = context(fetcher);

        let outcome = Walker::new(0, ctx, StdRng::seed_from_u64(1)).run().await;

        match outcome.ending {
            Ending::Aborted(reason) => assert!(reason.contains("no system"), "{reason}"),
            other => panic!("expected abort, got {:?}", other),
        }
        assert!(outcome.selections.is_empty());
        assert_eq!(stats.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_fetch_error_is_not_counted() {
        let fetcher = hierarchy(&two_map_route()).with_unreachable(ROUTE_URL, "reset by peer");
        let (ctx, stats) = context(fetcher);

        let outcome = Walker::new(0, ctx, StdRng::seed_from_u64(1)).run().await;

        assert!(matches!(outcome.ending, Ending::Aborted(_)));
        assert_eq!(stats.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_seed_same_selections() {
        let mut runs = Vec::new();
        for _ in 0..2 {
            let fetcher = hierarchy(&two_map_route()).with_json(STOP_A_URL, STOP_A);
            let (ctx, _) = context(fetcher);
            runs.push(Walker::new(7, ctx, StdRng::seed_from_u64(303)).run().await);
        }
        assert_eq!(runs[0], runs[1]);
        assert_eq!(runs[0].selections.len(), 3);
    }

    #[tokio::test]
    async fn test_stop_state_goes_to_end() {
        let (ctx, _) = context(FixtureFetcher::new());
        let mut walker = Walker::new(0, ctx, StdRng::seed_from_u64(0));
        let stop = Stop {
            id: "A".to_string(),
            name: String::new(),
            stop_times: Vec::new(),
        };

        let next = walker.transition(WalkState::Stop(stop)).await.unwrap();
        assert!(next.is_end());
    }

    #[tokio::test]
    #[should_panic(expected = "cannot transition out of the end state")]
    async fn test_transition_from_end_panics() {
        let (ctx, _) = context(FixtureFetcher::new());
        let mut walker = Walker::new(0, ctx, StdRng::seed_from_u64(0));
        let _ = walker.transition(WalkState::End).await;
    }
}
