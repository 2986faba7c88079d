//! End-to-end pipeline runs against a replay provider.

use std::path::Path;

use palimpsest::agents::DraftOrigin;
use palimpsest::config::Config;
use palimpsest::llm::providers::replay::ReplayProvider;
use palimpsest::pipeline::{CompositionRequest, Pipeline, PipelineError, Session};
use palimpsest::styles::{CreativeControls, Language};

// ── helpers ──────────────────────────────────────────────────────────────────

const DRAFT: &str = "## [RECONSTRUCTION_ID]\n[RECONSTRUCTED_CONTENT]\nThe harbour sleeps beneath a salt-grey moon,\nand oars forget the water's patient tune.\n[/DATA_SYNTHESIS_END]";

fn pack(poem: &str, initial: &str, final_: &str) -> String {
    format!(
        "[SECTION_EVALUATION]\n## 📊 VALUTAZIONE INIZIALE\n**Voto Iniziale:** {initial}/10\n**Spiegazione:** Rhythm stumbles in line two.\n\n[SECTION_POEM]\n## ✍️ POESIA RIVISTA\n{poem}\n\n[SECTION_NOTES]\n## 📊 VALUTAZIONE FINALE\n**Voto Finale:** {final_}/10\n**Spiegazione:** Cadence restored.\n[/SECTION]\n[/AUDIT_END]"
    )
}

fn config() -> Config {
    Config::builtin(Path::new("/tmp/palimpsest-test"))
}

fn request(style: &str) -> CompositionRequest {
    CompositionRequest {
        topic: "the harbour at night".into(),
        style: style.into(),
        language: Language::English,
        controls: CreativeControls::default(),
    }
}

// ── compose ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn threshold_reached_in_first_round() {
    let replay = ReplayProvider::new([
        DRAFT.to_string(),
        pack("Salt moon over the sleeping harbour,\noars dreaming of the tide.", "6", "8.5"),
    ]);
    let pipeline = Pipeline::new(replay.clone().into(), &config());
    let c = pipeline.compose(&request("Romantic Poetry")).await.unwrap();

    assert_eq!(replay.calls(), 2);
    assert_eq!(c.draft_origin, DraftOrigin::Model);
    assert_eq!(
        c.draft,
        "The harbour sleeps beneath a salt-grey moon,\nand oars forget the water's patient tune."
    );
    assert_eq!(c.final_poem, "Salt moon over the sleeping harbour,\noars dreaming of the tide.");
    assert_eq!(c.initial_score, 6.0);
    assert_eq!(c.final_score, 8.5);
    assert!(c.corrections.contains("Rhythm stumbles in line two."));
    assert!(!c.corrections.contains("Voto"));
    assert!(c.final_notes.contains("Cadence restored."));
    assert_eq!(c.rounds.len(), 1);
    assert_eq!(c.interpretation.rating_adherence, "85%");
    assert_eq!(c.timestamp.len(), 8);
}

#[tokio::test]
async fn rounds_chain_and_best_round_wins() {
    let replay = ReplayProvider::new([
        DRAFT.to_string(),
        pack("First revision of the harbour poem, still heavy.", "5", "6"),
        pack("Second revision of the harbour poem, much lighter.", "6", "7.5"),
        pack("Third revision of the harbour poem, overworked.", "7", "7"),
    ]);
    let pipeline = Pipeline::new(replay.clone().into(), &config());
    let c = pipeline.compose(&request("Modernism")).await.unwrap();

    assert_eq!(replay.calls(), 4);
    assert_eq!(c.rounds.len(), 3);
    assert_eq!(c.rounds[1].input, c.rounds[0].poem);
    assert_eq!(c.rounds[2].input, c.rounds[1].poem);
    assert!(replay.prompts()[2].contains("RAW_PAYLOAD: First revision"));

    assert_eq!(c.final_poem, "Second revision of the harbour poem, much lighter.");
    assert_eq!(c.final_score, 7.5);
    assert_eq!(c.initial_score, 5.0);
}

#[tokio::test]
async fn max_rounds_bounds_the_loop() {
    let mut cfg = config();
    cfg.pipeline.max_rounds = 1;
    let replay = ReplayProvider::new([
        DRAFT.to_string(),
        pack("Only revision allowed for this harbour poem.", "4", "5"),
    ]);
    let c = Pipeline::new(replay.clone().into(), &cfg)
        .compose(&request("Modernism"))
        .await
        .unwrap();
    assert_eq!(c.rounds.len(), 1);
    assert_eq!(replay.calls(), 2);
}

#[tokio::test]
async fn refusal_yields_emergency_draft() {
    let replay = ReplayProvider::new([
        "I'm sorry, but I can't write poetry about that.".to_string(),
        pack("The machine is quiet; the ghost still sings of glass and sky.", "6", "8"),
    ]);
    let c = Pipeline::new(replay.clone().into(), &config())
        .compose(&request("Beat Generation"))
        .await
        .unwrap();
    assert_eq!(c.draft_origin, DraftOrigin::Emergency);
    assert!(c.draft.starts_with("The machine is quiet, but the ghost is loud."));
    assert!(!c.draft.contains('['));
    assert!(replay.prompts()[1].contains("The machine is quiet, but the ghost is loud."));
}

#[tokio::test]
async fn unusable_critiques_fall_back_to_draft() {
    let mut cfg = config();
    cfg.pipeline.max_rounds = 1;
    let replay = ReplayProvider::new([DRAFT, "meh"]);
    let c = Pipeline::new(replay.clone().into(), &cfg)
        .compose(&request("Victorian Poetry"))
        .await
        .unwrap();
    assert_eq!(replay.calls(), 4);
    assert_eq!(c.final_poem, c.draft);
    assert_eq!(c.initial_score, 6.0);
    assert_eq!(c.final_score, 6.0);
}

#[tokio::test]
async fn failure_marker_in_draft_aborts() {
    let replay = ReplayProvider::new(["ERROR while sampling: the stream collapsed midway"]);
    let err = Pipeline::new(replay.into(), &config())
        .compose(&request("Modernism"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Draft(ref msg) if msg.contains("ERROR")));
}

#[tokio::test]
async fn provider_failure_is_typed() {
    let replay = ReplayProvider::new(Vec::<String>::new());
    let err = Pipeline::new(replay.into(), &config())
        .compose(&request("Modernism"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Provider(_)));
}

#[tokio::test]
async fn interpreter_reading_used_when_enabled() {
    let mut cfg = config();
    cfg.pipeline.interpreter = true;
    let replay = ReplayProvider::new([
        DRAFT.to_string(),
        pack("Salt moon over the sleeping harbour,\noars dreaming of the tide.", "6", "9"),
        "SCHEME: couplet\nMETRICS: iambic pentameter\nDEVICES: personification\nINTERPRETATION: Night as rest.".to_string(),
    ]);
    let c = Pipeline::new(replay.clone().into(), &cfg)
        .compose(&request("Romantic Poetry"))
        .await
        .unwrap();
    assert_eq!(replay.calls(), 3);
    assert_eq!(c.interpretation.scheme, "couplet");
    assert_eq!(c.interpretation.rating_adherence, "90%");
    assert!(replay.prompts()[2].contains("INPUT_TEXT: Salt moon over the sleeping harbour"));
}

#[cfg(feature = "knowledge")]
#[tokio::test]
async fn failure_marker_in_research_aborts() {
    use palimpsest::knowledge::KnowledgeBase;

    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("styles");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("modernism.txt"), "Modernism: fragment, montage, juxtaposition.").unwrap();

    let cfg = config();
    let kb = KnowledgeBase::open(tmp.path(), &cfg.knowledge).unwrap();
    kb.ingest_dir(&src).unwrap();

    let replay = ReplayProvider::new(["[RAG ERROR] index unavailable"]);
    let err = Pipeline::new(replay.clone().into(), &cfg)
        .with_archive(kb)
        .compose(&request("Modernism"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Research(_)));
    assert_eq!(replay.calls(), 1);
    assert!(replay.prompts()[0].contains("montage"));
}

// ── session ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_records_history_in_order() {
    let replay = ReplayProvider::new([
        DRAFT.to_string(),
        pack("A first poem about the harbour at night, done.", "6", "9"),
        DRAFT.to_string(),
        pack("A second poem about the harbour at dawn, done.", "6", "9"),
    ]);
    let pipeline = Pipeline::new(replay.into(), &config());
    let mut session = Session::new();

    for style in ["Modernism", "Ermetismo"] {
        let c = pipeline.compose(&request(style)).await.unwrap();
        session.record(&c);
    }

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].style, "Modernism");
    assert!(history[0].text.starts_with("A first poem"));
    assert_eq!(history[1].style, "Ermetismo");
}
