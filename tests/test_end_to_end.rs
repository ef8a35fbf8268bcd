use std::sync::Arc;

use memm::train::{Sampling, Trainer, TrainerParams};
use memm::{store, CatalogConfig, Corpus, Decoder, FeatureCatalog, Key, Thresholds};

fn params(iterations: usize) -> TrainerParams {
    let mut params = TrainerParams::default();
    params.set_regularization(0.1).unwrap();
    params.set_max_iterations(iterations).unwrap();
    params.set_sampling(Sampling::Full);
    params.set_seed(Some(42));
    params
}

#[test]
fn test_train_save_load_decode() {
    let corpus = Corpus::parse(b"A_N b_V\n").unwrap();
    let histories = corpus.histories(2).unwrap();
    let config = CatalogConfig::new(2).with_thresholds(Thresholds::accept_all());
    let catalog = FeatureCatalog::build(&histories, config).unwrap();
    let tags = corpus.tag_set().unwrap();

    // Observed unigrams and bigrams are retained
    assert!(catalog.index_of(&Key::new(["A"], ["N"], 1)).is_some());
    assert!(catalog.index_of(&Key::new(["b"], ["V"], 1)).is_some());
    assert!(catalog
        .index_of(&Key::new(["A", "b"], ["N", "V"], 1))
        .is_some());

    let mut trainer = Trainer::new(&catalog, tags.clone(), params(10)).unwrap();
    let reports = trainer.train(&corpus).unwrap();
    assert_eq!(reports.len(), 10);
    assert!(reports.iter().all(|r| r.objective.is_finite()));

    let decoder = Decoder::new(&catalog, trainer.weights(), tags.clone()).unwrap();
    assert_eq!(decoder.decode(&["A", "b"]).unwrap(), vec!["N", "V"]);

    // Save and reload
    let dir = tempfile::tempdir().unwrap();
    let features_path = dir.path().join("model.features");
    let weights_path = dir.path().join("model.weights");
    store::write_catalog(&features_path, &catalog, &tags).unwrap();
    store::write_weights(&weights_path, &trainer.weights()).unwrap();

    let (loaded_catalog, loaded_tags) = store::read_catalog(&features_path).unwrap();
    let loaded_weights = store::read_weights(&weights_path).unwrap();
    assert_eq!(loaded_tags, tags);
    assert_eq!(loaded_weights, trainer.weights().to_vec());

    let decoder = Decoder::new(&loaded_catalog, Arc::from(loaded_weights), loaded_tags).unwrap();
    assert_eq!(decoder.decode(&["A", "b"]).unwrap(), vec!["N", "V"]);
}

#[test]
fn test_resume_from_weights() {
    let corpus = Corpus::parse(b"The_DT dog_NN barks_VBZ\nA_DT cat_NN sleeps_VBZ\n").unwrap();
    let histories = corpus.histories(2).unwrap();
    let config = CatalogConfig::new(2).with_thresholds(Thresholds::accept_all());
    let catalog = FeatureCatalog::build(&histories, config).unwrap();
    let tags = corpus.tag_set().unwrap();

    let mut first = Trainer::new(&catalog, tags.clone(), params(3)).unwrap();
    let first_reports = first.train(&corpus).unwrap();

    let mut resumed =
        Trainer::with_weights(&catalog, tags.clone(), params(1), first.weights().to_vec()).unwrap();
    let resumed_reports = resumed.train(&corpus).unwrap();
    let last = first_reports.last().unwrap().objective;
    assert!(resumed_reports[0].objective <= last + 1e-9);

    assert!(Trainer::with_weights(&catalog, tags, params(1), vec![0.0; 3]).is_err());
}
