//! One extractor per source. Each is a pure transformation from raw
//! payload + query to scored candidate records.

pub mod ancestry;
pub mod anom;
pub mod antenati;
pub mod billiongraves;
pub mod digitalarkivet;
pub mod familysearch;
pub mod filae;
pub mod findagrave;
pub mod freebmd;
pub mod geneanet;
pub mod geni;
pub mod irishgenealogy;
pub mod matchid;
pub mod matricula;
pub mod myheritage;
pub mod scotlandspeople;
pub mod wikitree;

pub(crate) mod helpers;

/// First-page cap shared by every extractor.
pub(crate) const MAX_RECORDS: usize = 20;
