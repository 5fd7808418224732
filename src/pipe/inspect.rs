/// Hands every item to `f` by reference and forwards it unchanged.
///
/// Used at the tail of a partition pipeline to log emitted spikes.
pub fn inspect<T>(mut f: impl FnMut(&T)) -> impl FnMut(T) -> Option<T>
where
    T: bytemuck::Pod + Send,
{
    move |item| {
        f(&item);
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::WindowSummary;

    #[test]
    fn test_inspect_sees_every_summary() {
        let mut seen = Vec::new();
        {
            let mut pipe = inspect(|s: &WindowSummary| seen.push(s.sensor_id));
            for sensor_id in [4, 2, 4] {
                let summary = WindowSummary {
                    sensor_id,
                    ..Default::default()
                };
                assert_eq!(pipe(summary), Some(summary));
            }
        }
        assert_eq!(seen, vec![4, 2, 4]);
    }
}
