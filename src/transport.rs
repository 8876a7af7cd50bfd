//! Play position and the playing/stopped clock

/// Default skip distance in seconds
pub const DEFAULT_SKIP_SECONDS: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Position {
    Stopped { at: f64 },
    Playing { project_start: f64, clock_start: f64 },
}

/// The transport clock.
///
/// While playing the position follows the engine clock from the moment
/// playback started; while stopped it is a settable static value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transport {
    position: Position,
}

impl Default for Transport {
    fn default() -> Self {
        Self { position: Position::Stopped { at: 0.0 } }
    }
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.position, Position::Playing { .. })
    }

    /// Project time at engine clock `clock_now`
    pub fn current_time(&self, clock_now: f64) -> f64 {
        match self.position {
            Position::Stopped { at } => at,
            Position::Playing { project_start, clock_start } => {
                project_start + (clock_now - clock_start).max(0.0)
            }
        }
    }

    /// Move the static position; clamped to zero. Ignored while playing.
    pub fn set_current_time(&mut self, time: f64) {
        if let Position::Stopped { at } = &mut self.position {
            *at = time.max(0.0);
        }
    }

    /// Start following the clock from `project_time`
    pub fn play(&mut self, project_time: f64, clock_now: f64) {
        self.position = Position::Playing {
            project_start: project_time.max(0.0),
            clock_start: clock_now,
        };
    }

    /// Freeze at the position reached by `clock_now`, returning it
    pub fn stop(&mut self, clock_now: f64) -> f64 {
        let at = self.current_time(clock_now);
        self.position = Position::Stopped { at };
        at
    }

    /// Position after skipping by `delta` seconds from `clock_now`, clamped to zero
    pub fn skipped_by(&self, delta: f64, clock_now: f64) -> f64 {
        (self.current_time(clock_now) + delta).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_the_clock_while_playing() {
        let mut transport = Transport::new();
        transport.set_current_time(3.0);
        transport.play(3.0, 10.0);

        assert_eq!(transport.current_time(12.5), 5.5);
        assert_eq!(transport.stop(13.0), 6.0);
        assert_eq!(transport.current_time(99.0), 6.0);
    }

    #[test]
    fn static_position_is_clamped() {
        let mut transport = Transport::new();
        transport.set_current_time(-4.0);
        assert_eq!(transport.current_time(0.0), 0.0);
        assert_eq!(transport.skipped_by(-10.0, 0.0), 0.0);
        assert_eq!(transport.skipped_by(10.0, 0.0), 10.0);
    }
}
