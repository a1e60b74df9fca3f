//! Now-playing track state
//!
//! Metadata arrives on whichever connection is streaming but is read by
//! unrelated consumers (a UI, a status endpoint), so it lives in a versioned
//! watch channel owned by the receiver rather than in the session.

use std::sync::Arc;

use tokio::sync::watch;

use crate::protocol::daap::DmapTag;

/// Album artwork
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    /// Image data as sent
    pub data: Vec<u8>,
    /// MIME type from the request
    pub mime_type: String,
}

/// Track metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    /// Track title (`minm`)
    pub title: Option<String>,
    /// Artist name (`asar`)
    pub artist: Option<String>,
    /// Album name (`asal`)
    pub album: Option<String>,
    /// Genre (`asgn`)
    pub genre: Option<String>,
    /// Comment (`ascm`)
    pub comment: Option<String>,
    /// Composer (`ascp`)
    pub composer: Option<String>,
    /// File kind, e.g. "AAC audio file" (`asdt`)
    pub file_kind: Option<String>,
    /// Sort name (`assn`)
    pub sort_name: Option<String>,
    /// Cover art
    pub artwork: Option<Artwork>,
}

impl TrackInfo {
    /// Build from flattened DMAP records; the last occurrence of a tag wins
    #[must_use]
    pub fn from_dmap(items: &[(DmapTag, String)]) -> Self {
        let mut info = Self::default();
        for (tag, value) in items {
            let slot = match tag {
                DmapTag::SongAlbum => &mut info.album,
                DmapTag::SongArtist => &mut info.artist,
                DmapTag::SongComment => &mut info.comment,
                DmapTag::SongGenre => &mut info.genre,
                DmapTag::ItemName => &mut info.title,
                DmapTag::SongComposer => &mut info.composer,
                DmapTag::SongDescription => &mut info.file_kind,
                DmapTag::SortName => &mut info.sort_name,
                DmapTag::ListingItem | DmapTag::Unknown(_) => continue,
            };
            *slot = Some(value.clone());
        }
        info
    }
}

/// Versioned snapshot of the current track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackSnapshot {
    /// Bumped on every change
    pub version: u64,
    /// Track, if any metadata was received
    pub track: Option<TrackInfo>,
}

/// Shared handle to the current track
#[derive(Debug, Clone)]
pub struct CurrentTrack {
    tx: Arc<watch::Sender<TrackSnapshot>>,
}

impl CurrentTrack {
    /// Create with no track
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(TrackSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Latest snapshot
    #[must_use]
    pub fn snapshot(&self) -> TrackSnapshot {
        self.tx.borrow().clone()
    }

    /// Current track, if any
    #[must_use]
    pub fn get(&self) -> Option<TrackInfo> {
        self.tx.borrow().track.clone()
    }

    /// Subscribe to changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TrackSnapshot> {
        self.tx.subscribe()
    }

    /// Replace the track wholesale
    pub fn replace(&self, track: TrackInfo) {
        self.tx.send_modify(|snapshot| {
            snapshot.version += 1;
            snapshot.track = Some(track);
        });
    }

    /// Attach artwork, starting an empty track if none is known
    pub fn set_artwork(&self, artwork: Artwork) {
        self.tx.send_modify(|snapshot| {
            snapshot.version += 1;
            snapshot
                .track
                .get_or_insert_with(TrackInfo::default)
                .artwork = Some(artwork);
        });
    }

    /// Forget the current track
    pub fn clear(&self) {
        self.tx.send_modify(|snapshot| {
            snapshot.version += 1;
            snapshot.track = None;
        });
    }
}

impl Default for CurrentTrack {
    fn default() -> Self {
        Self::new()
    }
}
