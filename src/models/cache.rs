use chrono::{DateTime, Duration, Utc};

#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: std::time::Duration) -> Self {
        Self::created_at(value, ttl, Utc::now())
    }

    pub fn created_at(value: T, ttl: std::time::Duration, now: DateTime<Utc>) -> Self {
        let ttl = Duration::from_std(ttl).unwrap_or(Duration::MAX);
        Self {
            value,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
