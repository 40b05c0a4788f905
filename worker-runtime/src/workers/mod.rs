//! The nine concrete Workers, one module each. `app_data` is the sole
//! derived-data write-holder (`spec.md` §2/§4.6); `librosa`, `path_parser`,
//! `discogs`, `lastfm`, and `rutracker_scraper` compute and forward their
//! findings to it rather than writing a store directly — see DESIGN.md's
//! "app_data as write funnel" entry.

pub mod app_data;
pub mod catalog_intake;
pub mod discogs;
pub mod file_mover;
pub mod inventory;
pub mod lastfm;
pub mod librosa;
pub mod path_parser;
pub mod rutracker_scraper;
