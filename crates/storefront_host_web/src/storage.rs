//! `localStorage` facility and `storage`-event signal.

pub mod local_facility;
pub mod storage_signal;
