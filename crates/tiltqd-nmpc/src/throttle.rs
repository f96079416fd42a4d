/// Rate limiter for repeated log messages
#[derive(Debug, Clone)]
pub struct Throttle {
    period: f64,
    last: Option<f64>,
}

impl Throttle {
    pub fn new(period: f64) -> Self {
        Self { period, last: None }
    }

    /// True at most once per period; the first call always passes
    pub fn ready(&mut self, now: f64) -> bool {
        match self.last {
            Some(last) if now - last < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_limits_rate() {
        let mut throttle = Throttle::new(1.0);
        assert!(throttle.ready(0.0));
        assert!(!throttle.ready(0.5));
        assert!(!throttle.ready(0.99));
        assert!(throttle.ready(1.0));
        assert!(!throttle.ready(1.2));
    }
}
