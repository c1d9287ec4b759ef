//! Join coordinator: per-request keyed state for the two parallel
//! branches.
//!
//! Each request deposits its translation result and its inpainting result
//! independently; whichever deposit completes the pair removes the entry
//! and receives the `RenderJob`, so emission is exactly once. Requests
//! short-circuited before both branches start never touch the map.

use crate::domain::jobs::RenderJob;
use crate::domain::text_box::TranslatedItem;
use image::RgbImage;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The inpainting branch's contribution to a join.
#[derive(Debug)]
pub struct InpaintDeposit {
    pub original_image: RgbImage,
    pub inpainted_image: RgbImage,
}

#[derive(Debug, Default)]
struct PendingJoin {
    image_id: String,
    is_long: bool,
    translation: Option<Vec<TranslatedItem>>,
    inpainting: Option<InpaintDeposit>,
    created_at: Option<Instant>,
}

/// An entry evicted by the stale sweep, enough to route an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleEntry {
    pub request_id: String,
    pub image_id: String,
}

#[derive(Default)]
pub struct JoinCoordinator {
    // One mutex over the whole map; call rates make finer locking
    // pointless.
    entries: Mutex<HashMap<String, PendingJoin>>,
}

impl JoinCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the translation slot. Returns the render job when this
    /// deposit completed the pair.
    pub fn deposit_translation(
        &self,
        request_id: &str,
        image_id: &str,
        is_long: bool,
        items: Vec<TranslatedItem>,
    ) -> Option<RenderJob> {
        let mut entries = self.entries.lock().expect("join map poisoned");
        let entry = Self::entry(&mut entries, request_id, image_id, is_long);
        if entry.translation.is_some() {
            tracing::warn!(request_id, "Duplicate translation deposit ignored");
            return None;
        }
        entry.translation = Some(items);
        Self::take_if_complete(&mut entries, request_id)
    }

    /// Write the inpainting slot. Returns the render job when this deposit
    /// completed the pair.
    pub fn deposit_inpainting(
        &self,
        request_id: &str,
        image_id: &str,
        is_long: bool,
        deposit: InpaintDeposit,
    ) -> Option<RenderJob> {
        let mut entries = self.entries.lock().expect("join map poisoned");
        let entry = Self::entry(&mut entries, request_id, image_id, is_long);
        if entry.inpainting.is_some() {
            tracing::warn!(request_id, "Duplicate inpainting deposit ignored");
            return None;
        }
        entry.inpainting = Some(deposit);
        Self::take_if_complete(&mut entries, request_id)
    }

    /// Drop any partial state for a failed request. Returns whether an
    /// entry existed.
    pub fn abandon(&self, request_id: &str) -> bool {
        self.entries
            .lock()
            .expect("join map poisoned")
            .remove(request_id)
            .is_some()
    }

    /// Remove entries older than `max_age` so a branch that never reports
    /// cannot pin its request forever. Evicted requests go to the error
    /// path.
    pub fn sweep_stale(&self, max_age: Duration) -> Vec<StaleEntry> {
        let mut entries = self.entries.lock().expect("join map poisoned");
        let now = Instant::now();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| {
                entry
                    .created_at
                    .is_some_and(|created| now.duration_since(created) > max_age)
            })
            .map(|(request_id, _)| request_id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|request_id| {
                entries.remove(&request_id).map(|entry| StaleEntry {
                    request_id,
                    image_id: entry.image_id,
                })
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.lock().expect("join map poisoned").len()
    }

    fn entry<'map>(
        entries: &'map mut HashMap<String, PendingJoin>,
        request_id: &str,
        image_id: &str,
        is_long: bool,
    ) -> &'map mut PendingJoin {
        entries
            .entry(request_id.to_string())
            .or_insert_with(|| PendingJoin {
                image_id: image_id.to_string(),
                is_long,
                created_at: Some(Instant::now()),
                ..PendingJoin::default()
            })
    }

    fn take_if_complete(
        entries: &mut HashMap<String, PendingJoin>,
        request_id: &str,
    ) -> Option<RenderJob> {
        let ready = entries
            .get(request_id)
            .is_some_and(|entry| entry.translation.is_some() && entry.inpainting.is_some());
        if !ready {
            return None;
        }
        let entry = entries.remove(request_id)?;
        let inpainting = entry.inpainting?;
        Some(RenderJob {
            request_id: request_id.to_string(),
            image_id: entry.image_id,
            is_long: entry.is_long,
            original_image: inpainting.original_image,
            inpainted_image: inpainting.inpainted_image,
            translated_items: entry.translation.unwrap_or_default(),
        })
    }
}
