/// Only passes items that satisfy the predicate.
pub fn filter<T>(mut predicate: impl FnMut(&T) -> bool) -> impl FnMut(T) -> Option<T>
where
    T: bytemuck::Pod + Send,
{
    move |item| {
        if predicate(&item) { Some(item) } else { None }
    }
}

#[cfg(test)]
mod filter_tests {
    use super::*;
    use crate::measurement::WindowSummary;
    use crate::spike::SpikeFilter;

    #[test]
    fn test_filter_logic() {
        let mut pipe = filter(|x: &i32| *x > 0);

        assert_eq!(pipe(10), Some(10));
        assert_eq!(pipe(-5), None);
    }

    #[test]
    fn test_filter_with_spike_predicate() {
        let spikes = SpikeFilter::default();
        let mut pipe = filter(move |s: &WindowSummary| spikes.is_spike(s));

        let calm = WindowSummary {
            average_value: 100.0,
            current_value: 101.0,
            ..Default::default()
        };
        let spike = WindowSummary {
            current_value: 110.0,
            ..calm
        };
        assert_eq!(pipe(calm), None);
        assert_eq!(pipe(spike), Some(spike));
    }
}
