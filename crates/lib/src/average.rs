/// Integer running average over the last `N` samples.
///
/// The first sample after creation or [`reset`](Self::reset) fills the whole
/// window, so the average tracks the current value immediately instead of
/// ramping up from zero.
#[derive(Debug, Clone)]
pub struct RunningAverage<const N: usize> {
  values: [i64; N],
  current_position: usize,
  initialized: bool,
}

impl<const N: usize> Default for RunningAverage<N> {
  fn default() -> Self {
    Self::new()
  }
}

impl<const N: usize> RunningAverage<N> {
  pub fn new() -> Self {
    const { assert!(N > 0, "window must not be empty") };
    Self {
      values: [0; N],
      current_position: 0,
      initialized: false,
    }
  }

  /// Forget all samples; the next one refills the window.
  pub fn reset(&mut self) {
    self.initialized = false;
  }

  /// Mean of the window, truncated towards zero.
  pub fn average(&self) -> i64 {
    self.values.iter().sum::<i64>() / N as i64
  }

  pub fn add(&mut self, value: i64) {
    if self.initialized {
      self.values[self.current_position] = value;
      self.current_position = (self.current_position + 1) % N;
    } else {
      self.values = [value; N];
      self.current_position = 0;
      self.initialized = true;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_average_is_zero() {
    let avg = RunningAverage::<5>::new();
    assert_eq!(avg.average(), 0);
  }

  #[test]
  fn first_sample_fills_window() {
    let mut avg = RunningAverage::<5>::new();
    avg.add(1000);
    assert_eq!(avg.average(), 1000);
  }

  #[test]
  fn later_samples_replace_oldest() {
    let mut avg = RunningAverage::<4>::new();
    avg.add(100);
    avg.add(500);
    assert_eq!(avg.average(), 200);

    for _ in 0..3 {
      avg.add(500);
    }
    assert_eq!(avg.average(), 500);
  }

  #[test]
  fn reset_refills_on_next_sample() {
    let mut avg = RunningAverage::<3>::new();
    avg.add(100);
    avg.add(400);
    avg.reset();
    avg.add(-600);
    assert_eq!(avg.average(), -600);
  }

  #[test]
  fn average_truncates_toward_zero() {
    let mut avg = RunningAverage::<3>::new();
    avg.add(0);
    avg.add(-2);
    assert_eq!(avg.average(), 0);
  }
}
