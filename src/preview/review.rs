/// Tracks whether preview images may be stale in client caches.
///
/// After a retake the server reuses image URLs for new content, so previews
/// must bypass caches until the user has looked at the fresh images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewState {
    refresh: bool,
    token: u64,
}

impl ReviewState {
    /// `seed` keeps tokens distinct across sessions.
    pub const fn new(seed: u64) -> Self {
        Self {
            refresh: false,
            token: seed,
        }
    }

    pub const fn needs_refresh(&self) -> bool {
        self.refresh
    }

    /// Query suffix to append to image URLs, if caches must be bypassed.
    pub const fn cache_bust(&self) -> Option<u64> {
        if self.refresh {
            Some(self.token)
        } else {
            None
        }
    }

    /// Sets the refresh flag and moves to a new token, so images replaced
    /// again while already stale still miss the cache.
    ///
    /// Returns `true` if the flag changed.
    pub fn mark_stale(&mut self) -> bool {
        self.token = self.token.wrapping_add(1);
        !std::mem::replace(&mut self.refresh, true)
    }

    /// Returns `true` if the flag changed.
    pub fn mark_fresh(&mut self) -> bool {
        std::mem::replace(&mut self.refresh, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_state_exposes_new_token() {
        let mut review = ReviewState::new(100);
        assert_eq!(review.cache_bust(), None);

        assert!(review.mark_stale());
        assert_eq!(review.cache_bust(), Some(101));
        assert!(!review.mark_stale());
        assert_eq!(review.cache_bust(), Some(102));
        assert!(review.needs_refresh());
    }

    #[test]
    fn each_stale_period_gets_a_different_token() {
        let mut review = ReviewState::new(0);
        review.mark_stale();
        let first = review.cache_bust();
        assert!(review.mark_fresh());
        assert!(!review.mark_fresh());
        review.mark_stale();
        assert_ne!(review.cache_bust(), first);
    }
}
