// ==============================================================================
// timing.rs — LAP COUNTERS, LAP TIMES, FINISH ORDER
// ------------------------------------------------------------------------------
// Race owns one Timing. It only counts: deciding WHEN a lap is completed
// (route capture of node 0) happens in race.rs.
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarTiming {
    pub lap: u32,               // completed laps
    pub lap_start_ms: u64,
    pub last_lap_ms: Option<u64>,
    pub best_lap_ms: Option<u64>,
    pub finish_time_ms: Option<u64>,
    pub race_completed: bool,
}

/// Result of a lap completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LapEvent {
    pub car: usize,
    pub lap: u32,
    pub lap_time_ms: u64,
    pub new_best: bool,
    pub finished: Option<usize>, // finishing position (0-based)
}

#[derive(Debug, Clone)]
pub struct Timing {
    lap_count: u32,
    time_ms: u64,
    started: bool,
    cars: Vec<CarTiming>,
    finish_order: Vec<usize>,
}

impl Timing {
    pub fn new(num_cars: usize, lap_count: u32) -> Self {
        Self {
            lap_count,
            time_ms: 0,
            started: false,
            cars: vec![CarTiming::default(); num_cars],
            finish_order: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.time_ms = 0;
        self.started = false;
        self.finish_order.clear();
        self.cars.iter_mut().for_each(|c| *c = CarTiming::default());
    }

    pub fn start(&mut self) {
        self.started = true;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn tick(&mut self, step_ms: u32) {
        if self.started {
            self.time_ms += u64::from(step_ms);
        }
    }

    pub fn time_ms(&self) -> u64 {
        self.time_ms
    }

    pub fn lap_count(&self) -> u32 {
        self.lap_count
    }

    /// Close the running lap of `car`. Laps after the car finished are ignored.
    pub fn lap_completed(&mut self, car: usize) -> Option<LapEvent> {
        let now = self.time_ms;
        let lap_count = self.lap_count;
        let timing = self.cars.get_mut(car)?;
        if timing.race_completed {
            return None;
        }

        let lap_time_ms = now - timing.lap_start_ms;
        let new_best = timing.best_lap_ms.is_none_or(|best| lap_time_ms < best);
        timing.lap += 1;
        timing.lap_start_ms = now;
        timing.last_lap_ms = Some(lap_time_ms);
        if new_best {
            timing.best_lap_ms = Some(lap_time_ms);
        }

        let mut finished = None;
        if timing.lap >= lap_count {
            timing.race_completed = true;
            timing.finish_time_ms = Some(now);
            finished = Some(self.finish_order.len());
            self.finish_order.push(car);
        }

        Some(LapEvent { car, lap: timing.lap, lap_time_ms, new_best, finished })
    }

    pub fn car(&self, car: usize) -> Option<&CarTiming> {
        self.cars.get(car)
    }

    pub fn lap(&self, car: usize) -> u32 {
        self.cars.get(car).map_or(0, |c| c.lap)
    }

    pub fn race_completed(&self, car: usize) -> bool {
        self.cars.get(car).is_some_and(|c| c.race_completed)
    }

    pub fn current_lap_time_ms(&self, car: usize) -> u64 {
        self.cars.get(car).map_or(0, |c| self.time_ms.saturating_sub(c.lap_start_ms))
    }

    pub fn finish_order(&self) -> &[usize] {
        &self.finish_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_runs_only_after_start() {
        let mut timing = Timing::new(2, 3);
        timing.tick(16);
        assert_eq!(timing.time_ms(), 0);
        timing.start();
        timing.tick(16);
        timing.tick(16);
        assert_eq!(timing.time_ms(), 32);
    }

    #[test]
    fn laps_and_best_lap() {
        let mut timing = Timing::new(1, 3);
        timing.start();

        timing.tick(1000);
        let first = timing.lap_completed(0);
        assert_eq!(first.map(|e| (e.lap, e.lap_time_ms, e.new_best)), Some((1, 1000, true)));

        timing.tick(1500);
        let second = timing.lap_completed(0);
        assert_eq!(second.map(|e| (e.lap, e.lap_time_ms, e.new_best)), Some((2, 1500, false)));

        timing.tick(800);
        let third = timing.lap_completed(0);
        assert_eq!(third.map(|e| (e.new_best, e.finished)), Some((true, Some(0))));

        let car = timing.car(0).cloned().unwrap_or_default();
        assert_eq!(car.best_lap_ms, Some(800));
        assert_eq!(car.last_lap_ms, Some(800));
        assert_eq!(car.finish_time_ms, Some(3300));
        assert!(timing.race_completed(0));
    }

    #[test]
    fn finish_order_and_late_laps() {
        let mut timing = Timing::new(3, 1);
        timing.start();
        timing.tick(10);
        assert_eq!(timing.lap_completed(2).and_then(|e| e.finished), Some(0));
        timing.tick(10);
        assert_eq!(timing.lap_completed(0).and_then(|e| e.finished), Some(1));
        assert!(timing.lap_completed(2).is_none());
        assert_eq!(timing.finish_order(), &[2, 0]);
        assert!(!timing.race_completed(1));
        assert!(timing.lap_completed(7).is_none());
    }

    #[test]
    fn reset_clears_everything() {
        let mut timing = Timing::new(1, 1);
        timing.start();
        timing.tick(5);
        timing.lap_completed(0);
        timing.reset();
        assert!(!timing.is_started());
        assert_eq!(timing.lap(0), 0);
        assert!(timing.finish_order().is_empty());
    }
}
