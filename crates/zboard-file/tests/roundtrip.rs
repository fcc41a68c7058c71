//! 画布保存与恢复

use zboard_core::board::Board;
use zboard_core::config::BoardConfig;
use zboard_core::error::BoardError;
use zboard_file::{load, load_document, save, Document, FileError, Format};

fn hand_in_hand_board() -> Board {
    let mut board = Board::default();
    board
        .apply_json(
            r#"[
                {"type": "hand_in_hand", "r1": 120, "r2": 200, "alpha": 50, "beta": 65, "theta": 150},
                {"type": "midpoint", "point_name": "M", "line_name": "AC"},
                {"type": "ratio_point", "point_name": "R", "line_name": "BD", "ratio": 0.3}
            ]"#,
        )
        .unwrap();
    board.add_function("x^2 / 10 - 3", Some((-5.0, 5.0))).unwrap();
    board.fit_view(20.0);
    board
}

#[test]
fn test_both_formats_restore_identical_store() {
    let dir = tempfile::tempdir().unwrap();
    let board = hand_in_hand_board();

    for name in ["board.zboard", "board.json"] {
        let path = dir.path().join(name);
        let saved = save(&board, &path).unwrap();
        assert_eq!(saved.metadata.title, "board");

        let restored = load(&path, BoardConfig::default()).unwrap();
        assert_eq!(restored.store(), board.store(), "{name}");
        assert_eq!(restored.view(), board.view(), "{name}");
        assert_eq!(restored.functions(), board.functions(), "{name}");

        let document = load_document(&path).unwrap();
        assert_eq!(document.metadata.id, saved.metadata.id);
    }
}

#[test]
fn test_unknown_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.txt");
    assert!(matches!(
        save(&Board::default(), &path),
        Err(FileError::InvalidFormat(_))
    ));
    assert_eq!(
        Format::from_path(std::path::Path::new("A.ZBOARD")).unwrap(),
        Format::Native
    );
}

#[test]
fn test_cyclic_document_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cycle.json");

    let mut board = Board::default();
    board
        .apply_json(
            r#"[
                {"type": "point", "name": "A", "x": 0, "y": 0},
                {"type": "point", "name": "B", "x": 10, "y": 0},
                {"type": "line", "name": "AB", "start_point": "A", "end_point": "B"},
                {"type": "midpoint", "point_name": "M", "line_name": "AB"}
            ]"#,
        )
        .unwrap();
    let document = Document::from_board(&board, Default::default());

    // 让 A 依赖 M，M 又依赖 A
    let mut json = serde_json::to_value(&document).unwrap();
    let points = json["store"]["points"].as_array_mut().unwrap();
    let m = points.iter().find(|p| p["name"] == "M").unwrap()["derivation"].clone();
    let m_id = points.iter().find(|p| p["name"] == "M").unwrap()["id"].clone();
    let b_id = points.iter().find(|p| p["name"] == "B").unwrap()["id"].clone();
    let a = points.iter_mut().find(|p| p["name"] == "A").unwrap();
    let mut derivation = m;
    derivation["a"] = m_id;
    derivation["b"] = b_id;
    a["derivation"] = derivation;
    std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

    let err = load(&path, BoardConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        FileError::Board(BoardError::ConstraintCycle(_))
    ));
}
