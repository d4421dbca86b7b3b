//! Cascading before/after scene selection.
//!
//! Optical imagery is preferred: the least cloudy scene within
//! `optical_window_days` of each target date. When either optical window is
//! empty, the selector falls back to SAR, ranking by temporal distance to
//! the target within `sar_window_days`. Both tiers must yield two distinct
//! scenes or the tier is skipped.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use landwatch_geo::{BBox, Raster, SensorFamily};
use tracing::{debug, info};

use super::{with_retry, ImageCandidate, ImageryError, ImageryPair, ImagerySource, SearchRequest};
use crate::config::{RetryPolicy, SelectorConfig};

/// Picks an imagery pair for a job and loads its scenes.
pub struct ImageryPairSelector {
    source: Arc<dyn ImagerySource>,
    config: SelectorConfig,
    retry: RetryPolicy,
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn distance(candidate: &ImageCandidate, target: DateTime<Utc>) -> Duration {
    (candidate.acquired - target).abs()
}

impl ImageryPairSelector {
    pub fn new(source: Arc<dyn ImagerySource>, config: SelectorConfig, retry: RetryPolicy) -> Self {
        Self {
            source,
            config,
            retry,
        }
    }

    /// Find a before/after pair around `date_from` and `date_to`.
    ///
    /// `cloud_threshold` is a percentage and only applies to optical scenes.
    pub async fn select_pair(
        &self,
        bbox: &BBox,
        date_from: NaiveDate,
        date_to: NaiveDate,
        cloud_threshold: f64,
    ) -> Result<ImageryPair, ImageryError> {
        if let Some(pair) = self
            .optical_pair(bbox, date_from, date_to, cloud_threshold)
            .await?
        {
            info!(
                before = %pair.before.id,
                after = %pair.after.id,
                "selected optical imagery pair"
            );
            return Ok(pair);
        }

        debug!("optical pair unavailable, falling back to SAR");
        if let Some(pair) = self.sar_pair(bbox, date_from, date_to).await? {
            info!(
                before = %pair.before.id,
                after = %pair.after.id,
                "selected SAR imagery pair"
            );
            return Ok(pair);
        }

        Err(ImageryError::NotFound(format!(
            "no optical or SAR imagery pair for {date_from}..{date_to}"
        )))
    }

    /// Load a scene through the retry policy.
    pub async fn load(
        &self,
        candidate: &ImageCandidate,
        bbox: &BBox,
    ) -> Result<Raster, ImageryError> {
        with_retry(&self.retry, "load", || self.source.load(candidate, bbox)).await
    }

    async fn optical_pair(
        &self,
        bbox: &BBox,
        date_from: NaiveDate,
        date_to: NaiveDate,
        cloud_threshold: f64,
    ) -> Result<Option<ImageryPair>, ImageryError> {
        let window = Duration::days(self.config.optical_window_days);
        let collection = &self.config.optical_collection;

        let rank = |a: &ImageCandidate, b: &ImageCandidate, target: DateTime<Utc>| {
            let ca = a.cloud_cover.unwrap_or(f64::INFINITY);
            let cb = b.cloud_cover.unwrap_or(f64::INFINITY);
            ca.total_cmp(&cb)
                .then_with(|| distance(a, target).cmp(&distance(b, target)))
                .then_with(|| a.id.cmp(&b.id))
        };
        let accept = |c: &ImageCandidate| {
            matches!(c.cloud_cover, Some(cc) if cc.is_finite() && cc <= cloud_threshold)
        };

        let before = self
            .best_in_window(
                bbox,
                collection,
                midnight(date_from),
                window,
                Some(cloud_threshold),
                &accept,
                &rank,
            )
            .await?;
        let Some(before) = before else {
            return Ok(None);
        };
        let after = self
            .best_in_window(
                bbox,
                collection,
                midnight(date_to),
                window,
                Some(cloud_threshold),
                &accept,
                &rank,
            )
            .await?;
        Ok(pair(before, after, SensorFamily::Optical))
    }

    async fn sar_pair(
        &self,
        bbox: &BBox,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Option<ImageryPair>, ImageryError> {
        let window = Duration::days(self.config.sar_window_days);
        let collection = &self.config.sar_collection;

        let rank = |a: &ImageCandidate, b: &ImageCandidate, target: DateTime<Utc>| {
            distance(a, target)
                .cmp(&distance(b, target))
                .then_with(|| a.id.cmp(&b.id))
        };
        let accept = |_: &ImageCandidate| true;

        let before = self
            .best_in_window(bbox, collection, midnight(date_from), window, None, &accept, &rank)
            .await?;
        let Some(before) = before else {
            return Ok(None);
        };
        let after = self
            .best_in_window(bbox, collection, midnight(date_to), window, None, &accept, &rank)
            .await?;
        Ok(pair(before, after, SensorFamily::Sar))
    }

    /// Search `target ± window` and return the best-ranked acceptable scene.
    #[allow(clippy::too_many_arguments)]
    async fn best_in_window<A, R>(
        &self,
        bbox: &BBox,
        collection: &str,
        target: DateTime<Utc>,
        window: Duration,
        max_cloud_cover: Option<f64>,
        accept: &A,
        rank: &R,
    ) -> Result<Option<ImageCandidate>, ImageryError>
    where
        A: Fn(&ImageCandidate) -> bool,
        R: Fn(&ImageCandidate, &ImageCandidate, DateTime<Utc>) -> Ordering,
    {
        let request = SearchRequest {
            collection: collection.to_string(),
            bbox: *bbox,
            start: target - window,
            end: target + window,
            max_cloud_cover,
        };
        let candidates =
            with_retry(&self.retry, "search", || self.source.search(&request)).await?;

        let found = candidates.len();
        let best = candidates
            .into_iter()
            .filter(|c| c.collection == request.collection)
            .filter(|c| c.acquired >= request.start && c.acquired <= request.end)
            .filter(|c| accept(c))
            .min_by(|a, b| rank(a, b, target));

        debug!(
            collection = %collection,
            target = %target.date_naive(),
            found,
            selected = best.as_ref().map(|c| c.id.as_str()).unwrap_or("-"),
            "searched imagery window"
        );
        Ok(best)
    }
}

fn pair(
    before: ImageCandidate,
    after: Option<ImageCandidate>,
    sensor_family: SensorFamily,
) -> Option<ImageryPair> {
    let after = after?;
    if before.id == after.id {
        debug!(id = %before.id, "before and after resolve to the same scene");
        return None;
    }
    Some(ImageryPair {
        before,
        after,
        sensor_family,
    })
}
