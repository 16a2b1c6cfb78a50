//! Per-player presence state and the read-only view handed to consumers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use vanilla_presence_core::{GameMode, Key, PlayerData, User, Vec3d};

use crate::error::PresenceError;
use crate::world::{ServerWorld, WorldRegistry};

/// One known player: the identity from the user cache merged with the most
/// recent decoded save. Both halves are replaced wholesale and independently.
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    uuid: Uuid,
    user: Arc<User>,
    data: Arc<PlayerData>,
}

impl PlayerRecord {
    pub fn new(user: User, data: PlayerData) -> Result<Self, PresenceError> {
        check_uuid(user.uuid, data.uuid())?;
        Ok(Self {
            uuid: user.uuid,
            user: Arc::new(user),
            data: Arc::new(data),
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn data(&self) -> &PlayerData {
        &self.data
    }

    /// Replace the identity half. Rejected if it names another player.
    pub fn set_user(&mut self, user: User) -> Result<(), PresenceError> {
        check_uuid(self.uuid, user.uuid)?;
        self.user = Arc::new(user);
        Ok(())
    }

    /// Replace the snapshot half. Rejected if it belongs to another player.
    pub fn set_player_data(&mut self, data: PlayerData) -> Result<(), PresenceError> {
        check_uuid(self.uuid, data.uuid())?;
        self.data = Arc::new(data);
        Ok(())
    }

    /// Active iff the identity has not expired and the snapshot is younger
    /// than `max_age`.
    pub fn is_active(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        if self.user.is_expired(now) {
            return false;
        }
        let age = now - self.data.last_modified();
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => age < max_age,
            Err(_) => true,
        }
    }

    pub fn handle(&self, worlds: &WorldRegistry, now: DateTime<Utc>) -> PlayerHandle {
        let data = &self.data;
        let rotation = data.rotation();
        PlayerHandle {
            uuid: self.uuid,
            name: self.user.name.clone(),
            world: worlds.get(data.dimension()),
            dimension: data.dimension().clone(),
            position: data.position(),
            // stored as (yaw, pitch); consumers expect (pitch, yaw, roll)
            rotation: Vec3d::new(f64::from(rotation.y), f64::from(rotation.x), 0.0),
            sky_light: 0,
            block_light: 0,
            sneaking: false,
            invisible: data.is_invisible(now),
            game_mode: data.game_mode(),
        }
    }
}

fn check_uuid(expected: Uuid, actual: Uuid) -> Result<(), PresenceError> {
    if expected == actual {
        Ok(())
    } else {
        Err(PresenceError::UuidMismatch { expected, actual })
    }
}

/// What a consumer sees of an active player.
///
/// Light levels and sneaking cannot be derived from save files and are
/// reported as zero / `false`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerHandle {
    pub uuid: Uuid,
    pub name: String,
    #[serde(skip)]
    pub world: Option<Arc<ServerWorld>>,
    pub dimension: Key,
    pub position: Vec3d,
    pub rotation: Vec3d,
    pub sky_light: u8,
    pub block_light: u8,
    pub sneaking: bool,
    pub invisible: bool,
    pub game_mode: GameMode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use vanilla_presence_core::dimension;
    use vanilla_presence_core::testing::SaveBuilder;

    const ALICE: Uuid = Uuid::from_u128(0x069a79f4_44e9_4726_a5be_fca90e38aaf5);
    const BOB: Uuid = Uuid::from_u128(0x853c80ef_3c37_49fd_aa49_938b674adae6);
    const DAY: Duration = Duration::from_secs(86_400);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn user(uuid: Uuid, expires_on: DateTime<Utc>) -> User {
        User {
            name: "Alice".into(),
            uuid,
            expires_on,
        }
    }

    fn save(uuid: Uuid, captured: DateTime<Utc>, customize: impl FnOnce(SaveBuilder) -> SaveBuilder) -> PlayerData {
        let builder = SaveBuilder::new(uuid)
            .dimension("minecraft:the_nether")
            .game_mode(1)
            .position(1.0, 64.0, 1.0)
            .rotation(90.0, -15.0);
        PlayerData::decode(Path::new("test.dat"), &customize(builder).to_bytes(), captured).unwrap()
    }

    #[test]
    fn test_new_rejects_mismatched_halves() {
        let err = PlayerRecord::new(user(ALICE, t0()), save(BOB, t0(), |s| s)).unwrap_err();
        assert!(matches!(
            err,
            PresenceError::UuidMismatch { expected, actual } if expected == ALICE && actual == BOB
        ));
    }

    #[test]
    fn test_setters_reject_cross_assignment() {
        let mut record = PlayerRecord::new(user(ALICE, t0()), save(ALICE, t0(), |s| s)).unwrap();

        assert!(record.set_user(user(BOB, t0())).is_err());
        assert!(record.set_player_data(save(BOB, t0(), |s| s)).is_err());
        assert_eq!(record.user().uuid, ALICE);
        assert_eq!(record.data().uuid(), ALICE);

        let later = t0() + chrono::Duration::hours(1);
        record.set_player_data(save(ALICE, later, |s| s)).unwrap();
        assert_eq!(record.data().last_modified(), later);
    }

    #[test]
    fn test_liveness_requires_both_bounds() {
        let expires = t0() + chrono::Duration::minutes(10);
        let record = PlayerRecord::new(user(ALICE, expires), save(ALICE, t0(), |s| s)).unwrap();

        assert!(record.is_active(t0() + chrono::Duration::minutes(1), DAY));
        // identity expired
        assert!(!record.is_active(expires, DAY));

        let long_lived = PlayerRecord::new(
            user(ALICE, t0() + chrono::Duration::days(30)),
            save(ALICE, t0(), |s| s),
        )
        .unwrap();
        // snapshot too old
        assert!(long_lived.is_active(t0() + chrono::Duration::hours(23), DAY));
        assert!(!long_lived.is_active(t0() + chrono::Duration::days(1), DAY));
    }

    #[test]
    fn test_handle_projection() {
        let worlds = WorldRegistry::vanilla(Path::new("/srv/world"));
        let record = PlayerRecord::new(
            user(ALICE, t0() + chrono::Duration::days(1)),
            save(ALICE, t0(), |s| s.effect("minecraft:invisibility", 200)),
        )
        .unwrap();

        let handle = record.handle(&worlds, t0() + chrono::Duration::seconds(5));
        assert_eq!(handle.uuid, ALICE);
        assert_eq!(handle.name, "Alice");
        assert_eq!(handle.dimension, dimension::the_nether());
        assert_eq!(
            handle.world.as_ref().map(|w| w.dimension.clone()),
            Some(dimension::the_nether())
        );
        assert_eq!(handle.position, Vec3d::new(1.0, 64.0, 1.0));
        assert_eq!(handle.rotation, Vec3d::new(-15.0, 90.0, 0.0));
        assert_eq!(handle.game_mode, GameMode::Creative);
        assert_eq!((handle.sky_light, handle.block_light, handle.sneaking), (0, 0, false));
        assert!(handle.invisible);

        // 200 ticks = 10 s after capture
        let later = record.handle(&worlds, t0() + chrono::Duration::seconds(10));
        assert!(!later.invisible);
    }

    #[test]
    fn test_handle_serializes_without_world() {
        let worlds = WorldRegistry::default();
        let record = PlayerRecord::new(
            user(ALICE, t0() + chrono::Duration::days(1)),
            save(ALICE, t0(), |s| s),
        )
        .unwrap();
        let handle = record.handle(&worlds, t0());
        assert!(handle.world.is_none());

        let json = serde_json::to_value(&handle).unwrap();
        assert_eq!(json["uuid"], "069a79f4-44e9-4726-a5be-fca90e38aaf5");
        assert_eq!(json["dimension"], "minecraft:the_nether");
        assert_eq!(json["gameMode"], "creative");
        assert_eq!(json["skyLight"], 0);
        assert!(json.get("world").is_none());
    }
}
