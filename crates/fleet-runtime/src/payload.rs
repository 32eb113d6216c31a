use fleet_core::config::{ContentConfig, SignalConfig};
use rand::seq::SliceRandom;
use rand::Rng;

/// One generated signal. Values are only meaningful in distribution; the
/// grid is visual variety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalPayload {
    pub mines_count: u32,
    pub attempts_count: u32,
    pub valid_minutes: u64,
    pub link: String,
    /// Row-major; `true` marks a cell.
    pub grid: Vec<bool>,
    pub grid_width: u32,
}

impl SignalPayload {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, signal: &SignalConfig, link: &str) -> Self {
        let mines_count = rng.gen_range(signal.mines_min..=signal.mines_max);
        let attempts_count = rng.gen_range(signal.attempts_min..=signal.attempts_max);
        let cells = (signal.grid_width * signal.grid_height) as usize;
        let marked = (attempts_count as usize).min(cells);

        let mut grid = vec![true; marked];
        grid.resize(cells, false);
        grid.shuffle(rng);

        Self {
            mines_count,
            attempts_count,
            valid_minutes: signal.validity_minutes(),
            link: link.to_string(),
            grid,
            grid_width: signal.grid_width.max(1),
        }
    }

    pub fn render_grid(&self, content: &ContentConfig) -> String {
        self.grid
            .chunks(self.grid_width as usize)
            .map(|row| {
                row.iter()
                    .map(|&m| {
                        if m {
                            content.marked_cell.as_str()
                        } else {
                            content.unmarked_cell.as_str()
                        }
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn render(&self, content: &ContentConfig) -> String {
        content
            .signal_template
            .replace("{mines}", &self.mines_count.to_string())
            .replace("{attempts}", &self.attempts_count.to_string())
            .replace("{valid_minutes}", &self.valid_minutes.to_string())
            .replace("{link}", &self.link)
            .replace("{grid}", &self.render_grid(content))
    }
}

/// Text of the countdown notice sent `offset_secs` into a sequence that
/// completes at `completion_secs`.
pub fn render_countdown(content: &ContentConfig, offset_secs: u64, completion_secs: u64) -> String {
    let remaining = completion_secs.saturating_sub(offset_secs).div_ceil(60);
    content
        .countdown_template
        .replace("{remaining_minutes}", &remaining.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_values_stay_in_range() {
        let signal = SignalConfig::default();
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let p = SignalPayload::generate(&mut rng, &signal, "https://example.com");
            assert!((3..=6).contains(&p.mines_count));
            assert!((4..=8).contains(&p.attempts_count));
            assert_eq!(p.grid.len(), 30);
            assert_eq!(p.grid.iter().filter(|&&m| m).count(), p.attempts_count as usize);
        }
    }

    #[test]
    fn grid_renders_fixed_width_rows() {
        let signal = SignalConfig::default();
        let content = ContentConfig {
            marked_cell: "X".into(),
            unmarked_cell: ".".into(),
            ..ContentConfig::default()
        };
        let p = SignalPayload::generate(&mut rand::thread_rng(), &signal, "l");
        let rendered = p.render_grid(&content);
        let rows: Vec<&str> = rendered.lines().collect();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.chars().count() == 6));
        assert_eq!(rendered.matches('X').count(), p.attempts_count as usize);
    }

    #[test]
    fn template_placeholders_are_filled() {
        let content = ContentConfig {
            signal_template: "{mines}/{attempts}/{valid_minutes}/{link}".into(),
            ..ContentConfig::default()
        };
        let p = SignalPayload {
            mines_count: 4,
            attempts_count: 7,
            valid_minutes: 5,
            link: "https://example.com/play".into(),
            grid: vec![],
            grid_width: 6,
        };
        assert_eq!(p.render(&content), "4/7/5/https://example.com/play");
    }

    #[test]
    fn countdown_rounds_remaining_minutes_up() {
        let content = ContentConfig::default();
        assert_eq!(render_countdown(&content, 3, 300), "5 min left");
        assert_eq!(render_countdown(&content, 120, 300), "3 min left");
        assert_eq!(render_countdown(&content, 240, 300), "1 min left");
    }
}
