use serde::Serialize;
use sqlx::SqliteConnection;

use super::EconomyError;
use crate::db::Repository;
use crate::domain::{Pet, PetId, Player, PlayerId};

/// Which pets an action needs to see.
#[derive(Debug, Clone, Copy)]
pub enum PetScope<'a> {
    None,
    One(&'a PetId),
    All,
}

/// Consistent pre-image of everything an action validates against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub player: Player,
    pub pets: Vec<Pet>,
}

impl Snapshot {
    /// Read player and pets inside the caller's transaction.
    ///
    /// A pet that is missing or owned by someone else is reported as `NotFound`.
    pub async fn load(
        conn: &mut SqliteConnection,
        player_id: &PlayerId,
        scope: PetScope<'_>,
    ) -> Result<Self, EconomyError> {
        let player = Repository::load_player(&mut *conn, player_id)
            .await?
            .ok_or_else(|| EconomyError::NotFound(format!("player {}", player_id)))?;

        let pets = match scope {
            PetScope::None => Vec::new(),
            PetScope::All => Repository::load_pets(&mut *conn, player_id, None).await?,
            PetScope::One(pet_id) => {
                let pets = Repository::load_pets(&mut *conn, player_id, Some(pet_id)).await?;
                if pets.is_empty() {
                    return Err(EconomyError::NotFound(format!("pet {}", pet_id)));
                }
                pets
            }
        };

        Ok(Self { player, pets })
    }

    pub fn pet(&self, pet_id: &PetId) -> Result<&Pet, EconomyError> {
        self.pets
            .iter()
            .find(|p| &p.id == pet_id)
            .ok_or_else(|| EconomyError::NotFound(format!("pet {}", pet_id)))
    }
}
