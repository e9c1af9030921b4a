use glam::Vec3;

use crate::config::RunConfig;

/// Supplies the viewer position each frame
pub trait ViewerSource {
    fn position(&mut self, frame: u64, dt: f32) -> Vec3;
}

impl<V: ViewerSource + ?Sized> ViewerSource for Box<V> {
    fn position(&mut self, frame: u64, dt: f32) -> Vec3 {
        (**self).position(frame, dt)
    }
}

/// Viewer that never moves
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StaticViewer {
    pub position: Vec3,
}

impl StaticViewer {
    pub fn new(position: Vec3) -> Self {
        Self { position }
    }
}

impl ViewerSource for StaticViewer {
    fn position(&mut self, _frame: u64, _dt: f32) -> Vec3 {
        self.position
    }
}

/// Constant-speed walk along a closed loop of waypoints
///
/// Each call returns the current position and then advances by `speed * dt`.
#[derive(Debug, Clone)]
pub struct ScriptedPath {
    waypoints: Vec<Vec3>,
    speed: f32,
    loop_length: f32,
    segment: usize,
    travelled: f32,
}

impl ScriptedPath {
    pub fn new(waypoints: Vec<Vec3>, speed: f32) -> Self {
        let loop_length = if waypoints.len() < 2 {
            0.0
        } else {
            (0..waypoints.len())
                .map(|i| waypoints[i].distance(waypoints[(i + 1) % waypoints.len()]))
                .sum()
        };

        Self {
            waypoints,
            speed: speed.max(0.0),
            loop_length,
            segment: 0,
            travelled: 0.0,
        }
    }

    pub fn from_config(run: &RunConfig) -> Self {
        Self::new(
            run.waypoints.iter().copied().map(Vec3::from_array).collect(),
            run.viewer_speed,
        )
    }

    /// Length of one full loop
    pub fn loop_length(&self) -> f32 {
        self.loop_length
    }

    pub fn current(&self) -> Vec3 {
        match self.waypoints.len() {
            0 => Vec3::ZERO,
            1 => self.waypoints[0],
            n => {
                let from = self.waypoints[self.segment];
                let to = self.waypoints[(self.segment + 1) % n];
                let length = from.distance(to);
                if length <= f32::EPSILON {
                    from
                } else {
                    from.lerp(to, self.travelled / length)
                }
            }
        }
    }

    fn advance(&mut self, distance: f32) {
        if self.loop_length <= f32::EPSILON || distance <= 0.0 {
            return;
        }

        let n = self.waypoints.len();
        let mut remaining = distance % self.loop_length;
        loop {
            let length = self.waypoints[self.segment].distance(self.waypoints[(self.segment + 1) % n]);
            if self.travelled + remaining < length {
                self.travelled += remaining;
                return;
            }
            remaining -= length - self.travelled;
            self.travelled = 0.0;
            self.segment = (self.segment + 1) % n;
        }
    }
}

impl ViewerSource for ScriptedPath {
    fn position(&mut self, _frame: u64, dt: f32) -> Vec3 {
        let position = self.current();
        self.advance(self.speed * dt);
        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_viewer() {
        let mut viewer = StaticViewer::new(Vec3::new(250.0, 0.0, 250.0));
        assert_eq!(viewer.position(0, 1.0), Vec3::new(250.0, 0.0, 250.0));
        assert_eq!(viewer.position(9, 1.0), Vec3::new(250.0, 0.0, 250.0));
    }

    #[test]
    fn test_path_walks_at_constant_speed() {
        let mut path = ScriptedPath::new(
            vec![Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0), Vec3::new(100.0, 0.0, 100.0)],
            50.0,
        );

        assert_eq!(path.position(0, 1.0), Vec3::ZERO);
        assert!(path.position(1, 1.0).abs_diff_eq(Vec3::new(50.0, 0.0, 0.0), 1e-4));
        assert!(path.position(2, 1.0).abs_diff_eq(Vec3::new(100.0, 0.0, 0.0), 1e-4));
        assert!(path.position(3, 1.0).abs_diff_eq(Vec3::new(100.0, 0.0, 50.0), 1e-4));
    }

    #[test]
    fn test_path_loops() {
        let mut path = ScriptedPath::new(vec![Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)], 5.0);
        assert!((path.loop_length() - 20.0).abs() < 1e-5);

        let positions: Vec<Vec3> = (0..5).map(|frame| path.position(frame, 1.0)).collect();
        assert!(positions[2].abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), 1e-4));
        assert!(positions[3].abs_diff_eq(Vec3::new(5.0, 0.0, 0.0), 1e-4));
        assert!(positions[4].abs_diff_eq(Vec3::ZERO, 1e-4));
    }

    #[test]
    fn test_degenerate_paths() {
        let mut empty = ScriptedPath::new(Vec::new(), 10.0);
        assert_eq!(empty.position(0, 1.0), Vec3::ZERO);

        let point = Vec3::new(-250.0, 0.0, 250.0);
        let mut single = ScriptedPath::new(vec![point], 10.0);
        single.position(0, 1.0);
        assert_eq!(single.position(1, 1.0), point);

        let mut repeated = ScriptedPath::new(vec![point, point], 10.0);
        assert_eq!(repeated.position(0, 1.0), point);
        assert_eq!(repeated.position(1, 1.0), point);
    }
}
