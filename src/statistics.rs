use itertools::Itertools;
use serde::Serialize;

use crate::document::{Route, Track, Waypoint};
use crate::geo::haversine_distance;

/// Intervals slower than this are rest, not movement. unit: m/s
pub const MOVING_SPEED_THRESHOLD: f64 = 0.5;

/// Elevation deltas below this are sensor noise and count as flat. unit: m
pub const ELEVATION_NOISE_FLOOR: f64 = 1.0;

/// Derived aggregate metrics for an ordered point run. Never stored on the
/// document. Times are seconds, distances meters, speeds m/s, grades %.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub distance: f64,
    pub flat_distance: f64,
    pub moving_time: f64,
    pub rest_time: f64,
    pub total_time: f64,
    pub moving_speed: f64,
    pub overall_speed: f64,
    pub max_speed: f64,
    pub climb: f64,
    pub descent: f64,
    pub max_climb_grade: f64,
    pub max_descent_grade: f64,
    pub min_elevation: Option<f64>,
    pub max_elevation: Option<f64>,
    pub avg_elevation: Option<f64>,
    pub point_count: usize,
}

#[derive(Default)]
struct Accumulator {
    stats: Statistics,
    elevation_sum: f64,
    elevation_count: usize,
}

impl Accumulator {
    /// Feeds one contiguous run. Called once per segment so that the gap
    /// between segments never counts as an interval.
    fn feed(&mut self, points: &[Waypoint]) {
        for point in points {
            self.stats.point_count += 1;
            if let Some(elevation) = point.elevation {
                self.elevation_sum += elevation;
                self.elevation_count += 1;
                self.stats.min_elevation = Some(match self.stats.min_elevation {
                    Some(min) => min.min(elevation),
                    None => elevation,
                });
                self.stats.max_elevation = Some(match self.stats.max_elevation {
                    Some(max) => max.max(elevation),
                    None => elevation,
                });
            }
        }

        for (a, b) in points.iter().tuple_windows() {
            let distance =
                haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude);
            self.stats.distance += distance;

            // A point missing time or elevation only drops out of the
            // accumulators that need it.
            if let (Some(t0), Some(t1)) = (a.time, b.time) {
                let dt = (t1 - t0).num_milliseconds() as f64 / 1000.0;
                if dt > 0.0 {
                    self.stats.total_time += dt;
                    let speed = distance / dt;
                    if speed > MOVING_SPEED_THRESHOLD {
                        self.stats.moving_time += dt;
                    } else {
                        self.stats.rest_time += dt;
                    }
                    self.stats.max_speed = self.stats.max_speed.max(speed);
                }
            }

            if let (Some(e0), Some(e1)) = (a.elevation, b.elevation) {
                let delta = e1 - e0;
                if delta.abs() < ELEVATION_NOISE_FLOOR {
                    self.stats.flat_distance += distance;
                } else if delta > 0.0 {
                    self.stats.climb += delta;
                } else {
                    self.stats.descent += -delta;
                }
                if distance > 0.0 {
                    let grade = delta / distance * 100.0;
                    if grade > 0.0 {
                        self.stats.max_climb_grade = self.stats.max_climb_grade.max(grade);
                    } else {
                        self.stats.max_descent_grade =
                            self.stats.max_descent_grade.max(-grade);
                    }
                }
            }
        }
    }

    fn finish(mut self) -> Statistics {
        if self.elevation_count > 0 {
            self.stats.avg_elevation = Some(self.elevation_sum / self.elevation_count as f64);
        }
        if self.stats.moving_time > 0.0 {
            self.stats.moving_speed = self.stats.distance / self.stats.moving_time;
        }
        if self.stats.total_time > 0.0 {
            self.stats.overall_speed = self.stats.distance / self.stats.total_time;
        }
        self.stats
    }
}

/// Statistics over one contiguous run of points. Fewer than 2 points (or
/// points missing optional fields) degrade the affected fields to their
/// defaults instead of failing.
pub fn segment_statistics(points: &[Waypoint]) -> Statistics {
    let mut acc = Accumulator::default();
    acc.feed(points);
    acc.finish()
}

pub fn track_statistics(track: &Track) -> Statistics {
    let mut acc = Accumulator::default();
    for segment in &track.segments {
        acc.feed(&segment.points);
    }
    acc.finish()
}

pub fn route_statistics(route: &Route) -> Statistics {
    segment_statistics(&route.points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Track, TrackSegment};
    use assert_float_eq::assert_float_absolute_eq;
    use chrono::{TimeZone, Utc};

    fn point(lat: f64, lng: f64, ele: Option<f64>, secs: Option<i64>) -> Waypoint {
        let mut p = Waypoint::new(lat, lng);
        p.elevation = ele;
        p.time = secs.map(|s| Utc.timestamp_opt(s, 0).unwrap());
        p
    }

    #[test]
    fn empty_and_single_point_are_zero() {
        assert_eq!(segment_statistics(&[]), Statistics::default());
        let stats = segment_statistics(&[point(45.0, -120.0, Some(10.0), Some(0))]);
        assert_eq!(stats.distance, 0.0);
        assert_eq!(stats.point_count, 1);
        assert_eq!(stats.min_elevation, Some(10.0));
        assert_eq!(stats.avg_elevation, Some(10.0));
    }

    #[test]
    fn climb_descent_and_noise_floor() {
        // 0.5 m delta is below the noise floor and routes to flat distance
        let points = [
            point(45.000, -120.0, Some(100.0), None),
            point(45.001, -120.0, Some(100.5), None),
            point(45.002, -120.0, Some(110.5), None),
            point(45.003, -120.0, Some(90.5), None),
        ];
        let stats = segment_statistics(&points);
        assert_float_absolute_eq!(stats.climb, 10.0, 1e-9);
        assert_float_absolute_eq!(stats.descent, 20.0, 1e-9);
        assert!(stats.flat_distance > 0.0);
        assert!(stats.flat_distance < stats.distance);
        assert_eq!(stats.min_elevation, Some(90.5));
        assert_eq!(stats.max_elevation, Some(110.5));
    }

    #[test]
    fn moving_vs_rest_classification() {
        // ~111 m in 60 s is moving; 0 m in 60 s is rest
        let points = [
            point(45.000, -120.0, None, Some(0)),
            point(45.001, -120.0, None, Some(60)),
            point(45.001, -120.0, None, Some(120)),
        ];
        let stats = segment_statistics(&points);
        assert_float_absolute_eq!(stats.moving_time, 60.0, 1e-9);
        assert_float_absolute_eq!(stats.rest_time, 60.0, 1e-9);
        assert_float_absolute_eq!(stats.total_time, 120.0, 1e-9);
        assert!(stats.moving_speed > stats.overall_speed);
        assert!(stats.max_speed > MOVING_SPEED_THRESHOLD);
    }

    #[test]
    fn missing_fields_only_drop_their_accumulators() {
        let points = [
            point(45.000, -120.0, Some(100.0), Some(0)),
            point(45.001, -120.0, None, None),
            point(45.002, -120.0, Some(120.0), Some(120)),
        ];
        let stats = segment_statistics(&points);
        assert!(stats.distance > 0.0);
        // neither interval had both elevations or both times
        assert_eq!(stats.climb, 0.0);
        assert_eq!(stats.total_time, 0.0);
        assert_eq!(stats.avg_elevation, Some(110.0));
    }

    #[test]
    fn grades() {
        // ~111 m horizontal, +11 m vertical → ~9.9% climb grade
        let points = [
            point(45.000, -120.0, Some(100.0), None),
            point(45.001, -120.0, Some(111.0), None),
            point(45.002, -120.0, Some(89.0), None),
        ];
        let stats = segment_statistics(&points);
        assert_float_absolute_eq!(stats.max_climb_grade, 9.89, 0.05);
        assert_float_absolute_eq!(stats.max_descent_grade, 19.78, 0.1);
    }

    #[test]
    fn segment_gaps_are_not_intervals() {
        let mut track = Track::new("#e6194b".to_string());
        track.segments.push(TrackSegment::new(vec![
            point(45.000, -120.0, None, Some(0)),
            point(45.001, -120.0, None, Some(60)),
        ]));
        // far away and much later; must not contribute distance or time
        track.segments.push(TrackSegment::new(vec![
            point(50.000, -110.0, None, Some(100000)),
            point(50.001, -110.0, None, Some(100060)),
        ]));
        let stats = track_statistics(&track);
        let single = segment_statistics(&track.segments[0].points);
        assert_float_absolute_eq!(stats.distance, single.distance * 2.0, 1.0);
        assert_float_absolute_eq!(stats.total_time, 120.0, 1e-9);
        assert_eq!(stats.point_count, 4);
    }

    #[test]
    fn distance_accumulates_monotonically() {
        let mut points = vec![point(45.0, -120.0, None, None)];
        let mut last = 0.0;
        for i in 1..20 {
            points.push(point(45.0 + i as f64 * 0.001, -120.0, None, None));
            let d = segment_statistics(&points).distance;
            assert!(d >= last);
            last = d;
        }
    }
}
