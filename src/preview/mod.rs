mod review;

pub use review::ReviewState;

use crate::workflow::ImageRef;

/// One clickable thumbnail of the split preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewTile {
    pub image: ImageRef,
    pub thumb_url: String,
    pub full_url: String,
}

impl PreviewTile {
    pub fn new(image: &ImageRef, cache_bust: Option<u64>) -> Self {
        Self {
            image: image.clone(),
            thumb_url: image.thumb_url(cache_bust),
            full_url: image.full_url(cache_bust),
        }
    }
}

/// The two most recent captures, shown side by side as odd and even page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewPair {
    pub odd: PreviewTile,
    pub even: PreviewTile,
}

impl PreviewPair {
    /// Returns `None` until at least two images exist.
    pub fn from_images(images: &[ImageRef], cache_bust: Option<u64>) -> Option<Self> {
        let [.., odd, even] = images else {
            return None;
        };
        Some(Self {
            odd: PreviewTile::new(odd, cache_bust),
            even: PreviewTile::new(even, cache_bust),
        })
    }
}
