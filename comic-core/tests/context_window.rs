//! Property tests for the rolling context window.

use comic_core::testing::{descriptor, MockImageGenerator};
use comic_core::{ContextWindow, RenderedPanel};
use proptest::prelude::*;

fn rendered(index: usize, characters: &[&str]) -> RenderedPanel {
    RenderedPanel {
        descriptor: descriptor(index, characters),
        image: MockImageGenerator::image_for(index),
        render_attempts: 1,
    }
}

proptest! {
    #[test]
    fn window_never_exceeds_its_bound(max in 1usize..6, renders in 0usize..40) {
        let mut window = ContextWindow::new(max);
        for i in 0..renders {
            window.record(&rendered(i, &["Leafy"]));
            prop_assert!(window.len() <= max);
        }

        let kept = renders.min(max);
        prop_assert_eq!(window.len(), kept);
        prop_assert_eq!(window.indices(), (renders - kept..renders).collect::<Vec<_>>());
    }

    #[test]
    fn payload_keeps_render_order(max in 1usize..4, casts in prop::collection::vec(0usize..3, 1..12)) {
        let names = ["Leafy", "Sunny", "Drop"];
        let mut window = ContextWindow::new(max);
        for (i, cast) in casts.iter().enumerate() {
            window.record(&rendered(i, &[names[*cast]]));
        }

        let next = descriptor(casts.len(), &["Leafy"]);
        let payload = window.context_for(&next);
        let order: Vec<usize> = payload.recent.iter().map(|e| e.index).collect();

        let mut sorted = order.clone();
        sorted.sort_unstable();
        prop_assert_eq!(&order, &sorted);
        prop_assert_eq!(payload.next_index, casts.len());
        prop_assert_eq!(payload.images().len(), order.len());
    }
}
