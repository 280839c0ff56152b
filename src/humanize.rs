//! Behavioral noise between interactions.
//!
//! A session that only ever fires synthetic clicks at exact element centers
//! has a behavioral fingerprint of its own. When enabled, the humanizer
//! precedes actions with probabilistic pointer drift and small scrolls.
//! Disabled by default; it roughly doubles per-match wall time.

use std::cell::Cell;

use rand::Rng;
use tracing::debug;

use crate::driver::PageDriver;

#[derive(Debug, Clone, Copy)]
pub struct MouseMoveConfig {
    pub probability: f64,
    pub min_offset: u32,
    pub max_offset: u32,
    pub min_steps: u32,
    pub max_steps: u32,
}

impl Default for MouseMoveConfig {
    fn default() -> Self {
        Self {
            probability: 0.65,
            min_offset: 40,
            max_offset: 180,
            min_steps: 12,
            max_steps: 28,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScrollConfig {
    pub probability: f64,
    pub min_distance: u32,
    pub max_distance: u32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            probability: 0.35,
            min_distance: 150,
            max_distance: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HumanizeConfig {
    pub enabled: bool,
    pub mouse: MouseMoveConfig,
    pub scroll: ScrollConfig,
}

impl HumanizeConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

/// Injects pointer movement and scrolling ahead of page actions.
///
/// Tracks the virtual pointer position across calls so consecutive moves
/// form a continuous path instead of teleporting from the origin each time.
pub struct Humanizer {
    config: HumanizeConfig,
    pointer: Cell<Option<(f64, f64)>>,
}

impl Humanizer {
    pub fn new(config: HumanizeConfig) -> Self {
        Self {
            config,
            pointer: Cell::new(None),
        }
    }

    /// Pre-action hook. Failures are demoted to debug logs; noise must never
    /// fail a scrape.
    pub async fn before_action<P: PageDriver>(&self, page: &P) {
        if !self.config.enabled {
            return;
        }

        self.maybe_move_pointer(page).await;
        self.maybe_scroll(page).await;
    }

    async fn maybe_move_pointer<P: PageDriver>(&self, page: &P) {
        let config = self.config.mouse;
        let viewport = page.viewport();

        // All sampling happens before the first await; the rng is not Send.
        let plan = {
            let mut rng = rand::thread_rng();
            if rng.gen::<f64>() > config.probability {
                None
            } else {
                let (x, y) = self.pointer.get().unwrap_or((
                    f64::from(viewport.width) / 2.0,
                    f64::from(viewport.height) / 2.0,
                ));

                let min = config.min_offset.min(config.max_offset);
                let max = config.max_offset.max(min + 1);
                let dx = signed_offset(&mut rng, min, max);
                let dy = signed_offset(&mut rng, min, max);

                let target_x = (x + dx).clamp(0.0, f64::from(viewport.width) - 1.0);
                let target_y = (y + dy).clamp(0.0, f64::from(viewport.height) - 1.0);
                let min_steps = config.min_steps.max(2);
                let steps = rng.gen_range(min_steps..=config.max_steps.max(min_steps + 1));

                Some((target_x, target_y, steps))
            }
        };

        let Some((x, y, steps)) = plan else { return };

        if let Err(error) = page.move_pointer(x, y, steps).await {
            debug!("pointer drift skipped: {error}");
            return;
        }
        self.pointer.set(Some((x, y)));
    }

    async fn maybe_scroll<P: PageDriver>(&self, page: &P) {
        let config = self.config.scroll;
        let distance = {
            let mut rng = rand::thread_rng();
            if rng.gen::<f64>() > config.probability {
                return;
            }
            let min = config.min_distance.min(config.max_distance).max(1);
            let max = config.max_distance.max(min + 1);
            signed_offset(&mut rng, min, max)
        };

        if let Err(error) = page.scroll_by(distance).await {
            debug!("scroll simulation skipped: {error}");
        }
    }
}

fn signed_offset(rng: &mut impl Rng, min: u32, max: u32) -> f64 {
    let magnitude = f64::from(rng.gen_range(min..=max));
    if rng.gen_bool(0.5) {
        magnitude
    } else {
        -magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeSite;
    use crate::driver::Driver;

    #[test]
    fn defaults_are_disabled() {
        assert!(!HumanizeConfig::default().enabled);
        assert!(HumanizeConfig::enabled().enabled);
    }

    #[test]
    fn signed_offset_magnitude_stays_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let offset = signed_offset(&mut rng, 40, 180).abs();
            assert!((40.0..=180.0).contains(&offset));
        }
    }

    #[tokio::test]
    async fn before_action_emits_pointer_and_scroll_noise() {
        let site = FakeSite::new();
        let driver = site.driver();
        let page = driver.open_page().await.unwrap();

        let humanizer = Humanizer::new(HumanizeConfig {
            enabled: true,
            mouse: MouseMoveConfig { probability: 1.0, ..MouseMoveConfig::default() },
            scroll: ScrollConfig { probability: 1.0, ..ScrollConfig::default() },
        });

        humanizer.before_action(&page).await;
        humanizer.before_action(&page).await;

        assert_eq!(site.pointer_moves(), 2);
        assert_eq!(site.scrolls(), 2);
    }

    #[tokio::test]
    async fn disabled_humanizer_leaves_the_page_alone() {
        let site = FakeSite::new();
        let driver = site.driver();
        let page = driver.open_page().await.unwrap();

        let humanizer = Humanizer::new(HumanizeConfig::default());
        humanizer.before_action(&page).await;

        assert_eq!(site.pointer_moves(), 0);
        assert_eq!(site.scrolls(), 0);
    }
}
