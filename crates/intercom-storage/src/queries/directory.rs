// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Directory lookups (apartments, profiles, residents) and seeding.

use intercom_core::{Apartment, IntercomError, Profile};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{DirectorySeed, SeedReport, decode_enum};

fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        full_name: row.get(1)?,
        user_type: decode_enum(2, row.get(2)?)?,
        building_id: row.get(3)?,
    })
}

/// Looks up an apartment by building and number.
pub async fn find_apartment(
    db: &Database,
    building_id: &str,
    number: &str,
) -> Result<Option<Apartment>, IntercomError> {
    let building_id = building_id.to_string();
    let number = number.trim().to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Apartment>, rusqlite::Error> {
            conn.query_row(
                "SELECT id, building_id, number, block FROM apartments
                 WHERE building_id = ?1 AND number = ?2",
                params![building_id, number],
                |row| {
                    Ok(Apartment {
                        id: row.get(0)?,
                        building_id: row.get(1)?,
                        number: row.get(2)?,
                        block: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Looks up a profile by id.
pub async fn find_profile(db: &Database, id: &str) -> Result<Option<Profile>, IntercomError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Profile>, rusqlite::Error> {
            conn.query_row(
                "SELECT id, full_name, user_type, building_id FROM profiles WHERE id = ?1",
                params![id],
                profile_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Active resident profiles of an apartment, ordered by name.
pub async fn active_residents(
    db: &Database,
    apartment_id: &str,
) -> Result<Vec<Profile>, IntercomError> {
    let apartment_id = apartment_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Profile>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.full_name, p.user_type, p.building_id
                 FROM apartment_residents ar
                 JOIN profiles p ON p.id = ar.profile_id
                 WHERE ar.apartment_id = ?1 AND ar.is_active = 1 AND p.user_type = 'resident'
                 ORDER BY p.full_name, p.id",
            )?;
            let rows = stmt.query_map(params![apartment_id], profile_from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Upserts every entity of `seed` in a single transaction.
///
/// Re-running the same seed leaves the directory unchanged.
pub async fn apply_seed(db: &Database, seed: DirectorySeed) -> Result<SeedReport, IntercomError> {
    db.connection()
        .call(move |conn| -> Result<SeedReport, rusqlite::Error> {
            let tx = conn.transaction()?;
            let mut report = SeedReport::default();

            for b in &seed.buildings {
                tx.execute(
                    "INSERT INTO buildings (id, name, address) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET name = excluded.name, address = excluded.address",
                    params![b.id, b.name, b.address],
                )?;
                report.buildings += 1;
            }

            for p in &seed.profiles {
                tx.execute(
                    "INSERT INTO profiles (id, full_name, user_type, building_id) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET full_name = excluded.full_name,
                         user_type = excluded.user_type, building_id = excluded.building_id",
                    params![p.id, p.full_name, p.user_type.to_string(), p.building_id],
                )?;
                report.profiles += 1;
            }

            for a in &seed.apartments {
                tx.execute(
                    "INSERT INTO apartments (id, building_id, number, block) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET building_id = excluded.building_id,
                         number = excluded.number, block = excluded.block",
                    params![a.id, a.building_id, a.number, a.block],
                )?;
                report.apartments += 1;

                let links = a
                    .residents
                    .iter()
                    .map(|r| (r, true))
                    .chain(a.former_residents.iter().map(|r| (r, false)));
                for (profile_id, active) in links {
                    tx.execute(
                        "INSERT INTO apartment_residents (apartment_id, profile_id, is_active)
                         VALUES (?1, ?2, ?3)
                         ON CONFLICT(apartment_id, profile_id) DO UPDATE SET is_active = excluded.is_active",
                        params![a.id, profile_id, active],
                    )?;
                    report.residents += 1;
                }
            }

            tx.commit()?;
            Ok(report)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApartmentSeed, BuildingSeed, ProfileSeed};
    use intercom_core::UserType;

    fn seed() -> DirectorySeed {
        let profile = |id: &str, name: &str, user_type| ProfileSeed {
            id: id.into(),
            full_name: name.into(),
            user_type,
            building_id: Some("b1".into()),
        };
        DirectorySeed {
            buildings: vec![BuildingSeed {
                id: "b1".into(),
                name: "Tower A".into(),
                address: None,
            }],
            profiles: vec![
                profile("d1", "Front Desk", UserType::Doorman),
                profile("r1", "Bruna", UserType::Resident),
                profile("r2", "Alice", UserType::Resident),
                profile("r3", "Carlos", UserType::Resident),
            ],
            apartments: vec![ApartmentSeed {
                id: "apt-302".into(),
                building_id: "b1".into(),
                number: "302".into(),
                block: Some("A".into()),
                residents: vec!["r1".into(), "r2".into()],
                former_residents: vec!["r3".into()],
            }],
        }
    }

    #[tokio::test]
    async fn only_active_residents_are_listed() {
        let db = Database::open_in_memory().await.unwrap();
        apply_seed(&db, seed()).await.unwrap();

        let apartment = find_apartment(&db, "b1", " 302 ").await.unwrap().unwrap();
        assert_eq!(apartment.block.as_deref(), Some("A"));

        let residents = active_residents(&db, &apartment.id).await.unwrap();
        let ids: Vec<_> = residents.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
    }

    #[tokio::test]
    async fn seeding_twice_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let first = apply_seed(&db, seed()).await.unwrap();
        let second = apply_seed(&db, seed()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(active_residents(&db, "apt-302").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_rows_are_none() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(find_apartment(&db, "b1", "999").await.unwrap().is_none());
        assert!(find_profile(&db, "ghost").await.unwrap().is_none());
    }
}
