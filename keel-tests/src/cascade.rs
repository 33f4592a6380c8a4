use keel::{Driver, Engine, Entity};

#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Team {
    #[keel("pk autoincr")]
    pub id: i64,
    pub name: String,
}

#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Player {
    #[keel("pk autoincr")]
    pub id: i64,
    pub name: String,
    #[keel("cascade")]
    pub team: Team,
    #[keel("-")]
    pub scratch: String,
}

pub async fn cascade<D: Driver>(engine: &Engine<D>) {
    // Setup
    engine
        .drop_tables(&[Player::declaration(), Team::declaration()])
        .await
        .expect("Failed to drop the tables");
    engine
        .create_tables(&[Team::declaration(), Player::declaration()])
        .await
        .expect("Failed to create the tables");
    let table = engine.describe::<Player>().expect("Failed to describe Player");
    assert!(table.column("team_id").is_some());
    assert!(table.column("scratch").is_none());

    let mut team = Team {
        name: "Otters".into(),
        ..Default::default()
    };
    engine.insert(&mut team).await.expect("Failed to insert the team");
    let mut player = Player {
        name: "Kim".into(),
        team: team.clone(),
        scratch: "not stored".into(),
        ..Default::default()
    };
    engine.insert(&mut player).await.expect("Failed to insert the player");
    let mut orphan = Player {
        name: "Lou".into(),
        team: Team {
            id: 999,
            ..Default::default()
        },
        ..Default::default()
    };
    engine.insert(&mut orphan).await.expect("Failed to insert the player");

    // get loads the association
    let mut loaded = Player {
        id: player.id,
        ..Default::default()
    };
    assert!(engine.get(&mut loaded).await.expect("Failed to get"));
    assert_eq!(loaded.team, team);
    assert_eq!(loaded.name, "Kim");
    assert!(loaded.scratch.is_empty());

    // A missing row keeps the key only
    let mut loaded = Player {
        id: orphan.id,
        ..Default::default()
    };
    assert!(engine.get(&mut loaded).await.expect("Failed to get"));
    assert_eq!(loaded.team.id, 999);
    assert!(loaded.team.name.is_empty());

    // find fills the key only
    let mut players: Vec<Player> = Vec::new();
    engine
        .asc(["id"])
        .find(&mut players)
        .await
        .expect("Failed to find");
    assert_eq!(players.len(), 2);
    assert_eq!(players[0].team.id, team.id);
    assert!(players[0].team.name.is_empty());
    assert_eq!(players[1].team.id, 999);

    // The association key works as a condition
    let mut players: Vec<Player> = Vec::new();
    engine
        .find_by(
            &mut players,
            &Player {
                team: Team {
                    id: team.id,
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .await
        .expect("Failed to find");
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].id, player.id);

    engine
        .drop_tables(&[Player::declaration(), Team::declaration()])
        .await
        .expect("Failed to drop the tables");
}
