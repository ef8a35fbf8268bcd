use memm::train::{Control, Objective, Sampling, Trainer, TrainerParams};
use memm::{CatalogConfig, Corpus, Error, FeatureCatalog, HistoryVectorizer, Thresholds};

const CORPUS: &[u8] = b"The_DT dog_NN barks_VBZ\n\
A_DT cat_NN sleeps_VBZ\n\
Dogs_NNS bark_VBP loudly_RB\n\
The_DT 2_CD cats_NNS sleep_VBP\n\
A_DT bird_NN sings_VBZ\n";

fn setup() -> (Corpus, FeatureCatalog) {
    let corpus = Corpus::parse(CORPUS).unwrap();
    let histories = corpus.histories(2).unwrap();
    let config = CatalogConfig::new(2).with_thresholds(Thresholds::accept_all());
    let catalog = FeatureCatalog::build(&histories, config).unwrap();
    (corpus, catalog)
}

fn params(iterations: usize, sampling: Sampling) -> TrainerParams {
    let mut params = TrainerParams::default();
    params.set_max_iterations(iterations).unwrap();
    params.set_sampling(sampling);
    params.set_seed(Some(1));
    params
}

#[test]
fn test_full_batch_objective_is_non_increasing() {
    let (corpus, catalog) = setup();
    let tags = corpus.tag_set().unwrap();
    let mut trainer = Trainer::new(&catalog, tags.clone(), params(6, Sampling::Full)).unwrap();

    let vectorizer = HistoryVectorizer::new(&catalog);
    let histories = corpus.histories(2).unwrap();
    let objective = Objective::new(&histories, &vectorizer, &tags, 0.5);
    let initial = objective.value(&trainer.weights()).unwrap();

    let reports = trainer.train(&corpus).unwrap();
    assert_eq!(reports.len(), 6);
    assert!(reports[0].objective <= initial + 1e-9);
    for pair in reports.windows(2) {
        assert!(
            pair[1].objective <= pair[0].objective + 1e-9,
            "objective increased from {} to {}",
            pair[0].objective,
            pair[1].objective
        );
    }
    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report.iteration, i + 1);
        assert_eq!(report.histories, histories.len());
        assert!(report.gradient_norm.is_finite());
    }
    let last = reports.last().unwrap();
    assert!((objective.value(&trainer.weights()).unwrap() - last.objective).abs() < 1e-9);
}

#[test]
fn test_checkpoint_hook_is_called_every_iteration() {
    let (corpus, catalog) = setup();
    let tags = corpus.tag_set().unwrap();
    let mut trainer = Trainer::new(&catalog, tags, params(4, Sampling::Full)).unwrap();

    let mut seen = Vec::new();
    let reports = trainer
        .train_with(&corpus, |report, weights| {
            assert_eq!(weights.len(), catalog.len());
            seen.push(report.iteration);
            Ok(Control::Continue)
        })
        .unwrap();
    assert_eq!(seen, vec![1, 2, 3, 4]);
    assert_eq!(reports.len(), 4);
}

#[test]
fn test_checkpoint_hook_can_stop_training() {
    let (corpus, catalog) = setup();
    let tags = corpus.tag_set().unwrap();
    let mut trainer = Trainer::new(&catalog, tags, params(10, Sampling::Full)).unwrap();

    let mut snapshot = Vec::new();
    let reports = trainer
        .train_with(&corpus, |report, weights| {
            snapshot = weights.to_vec();
            if report.iteration == 2 {
                Ok(Control::Stop)
            } else {
                Ok(Control::Continue)
            }
        })
        .unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(&trainer.weights()[..], &snapshot[..]);
}

#[test]
fn test_checkpoint_hook_error_aborts_training() {
    let (corpus, catalog) = setup();
    let tags = corpus.tag_set().unwrap();
    let mut trainer = Trainer::new(&catalog, tags, params(10, Sampling::Full)).unwrap();
    let result = trainer.train_with(&corpus, |_, _| {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    });
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_random_batches_grow() {
    let (corpus, catalog) = setup();
    let tags = corpus.tag_set().unwrap();
    let mut params = params(3, Sampling::Random);
    params.set_batch_size(2).unwrap();
    params.set_max_batch_size(4).unwrap();
    let mut trainer = Trainer::new(&catalog, tags, params).unwrap();

    let mut sentences = Vec::new();
    trainer
        .train_with(&corpus, |report, _| {
            sentences.push(report.histories);
            Ok(Control::Continue)
        })
        .unwrap();
    // Batches of 2, 3 and 4 sentences, each of three or four tokens
    assert_eq!(sentences.len(), 3);
    assert!((6..=8).contains(&sentences[0]));
    assert!((9..=11).contains(&sentences[1]));
    assert!((12..=14).contains(&sentences[2]));
}

#[test]
fn test_seeded_training_is_reproducible() {
    let (corpus, catalog) = setup();
    let tags = corpus.tag_set().unwrap();
    let run = || {
        let mut params = params(2, Sampling::Random);
        params.set_batch_size(2).unwrap();
        let mut trainer = Trainer::new(&catalog, tags.clone(), params).unwrap();
        trainer.train(&corpus).unwrap();
        trainer.weights().to_vec()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_empty_corpus_is_rejected() {
    let (corpus, catalog) = setup();
    let tags = corpus.tag_set().unwrap();
    let mut trainer = Trainer::new(&catalog, tags, params(1, Sampling::Full)).unwrap();
    assert!(matches!(
        trainer.train(&Corpus::default()),
        Err(Error::Configuration(_))
    ));
}
