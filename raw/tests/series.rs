//! Test suite for grouping raw data files into series
use dicom_dictionary_std::tags;
use medimage_raw::sample::{large_pet_raw_data, payload, HeaderBuilder, SampleFile};
use medimage_raw::{group_series, BatchOptions, PetRawFormat, SeriesKey};
use std::fs;

#[test]
fn files_are_grouped_by_study_and_series() {
    let dir = tempfile::tempdir().unwrap();
    let study_a = "1.2.3.4";
    let study_b = "1.2.3.5";

    let samples = [
        SampleFile::new(PetRawFormat::Sinogram)
            .study_instance_uid(study_a)
            .series_number(2)
            .acquisition_time("120000"),
        SampleFile::new(PetRawFormat::ListMode)
            .study_instance_uid(study_b)
            .series_number(1),
        SampleFile::new(PetRawFormat::Sinogram)
            .study_instance_uid(study_a)
            .series_number(2)
            .acquisition_time("110000"),
        SampleFile::new(PetRawFormat::CountRate)
            .study_instance_uid(study_a)
            .series_number(10),
    ];
    let mut paths: Vec<_> = samples
        .iter()
        .enumerate()
        .map(|(i, sample)| sample.write_to(dir.path(), i).unwrap())
        .collect();

    // a header without Series Number
    let header = HeaderBuilder::new()
        .image_type("PET_PHYSIO")
        .text(tags::STUDY_INSTANCE_UID, b"UI", study_a)
        .build();
    let orphan = dir.path().join("orphan.ptd");
    fs::write(&orphan, large_pet_raw_data(&payload(50), &header)).unwrap();
    paths.push(orphan.clone());

    let (series, leftovers) = group_series(&paths, &BatchOptions::default());
    assert_eq!(leftovers, vec![orphan]);

    let keys: Vec<_> = series.iter().map(|s| s.key.clone()).collect();
    assert_eq!(
        keys,
        vec![
            SeriesKey {
                study_instance_uid: study_a.to_string(),
                series_number: 2,
            },
            SeriesKey {
                study_instance_uid: study_a.to_string(),
                series_number: 10,
            },
            SeriesKey {
                study_instance_uid: study_b.to_string(),
                series_number: 1,
            },
        ]
    );

    assert_eq!(series[0].format(), PetRawFormat::DynamicSinogram);
    assert_eq!(series[0].len(), 2);
    assert_eq!(series[0].members[0].file.path(), paths[2]);
    assert_eq!(series[0].members[1].file.path(), paths[0]);

    assert_eq!(series[1].format(), PetRawFormat::CountRate);
    assert_eq!(series[2].format(), PetRawFormat::ListMode);
}

#[test]
fn ties_are_broken_by_path() {
    let dir = tempfile::tempdir().unwrap();
    let sample = SampleFile::new(PetRawFormat::Sinogram);
    let paths: Vec<_> = (0..3)
        .rev()
        .map(|i| sample.write_to(dir.path(), i).unwrap())
        .collect();

    let (series, _) = group_series(&paths, &BatchOptions::default());
    let members: Vec<_> = series[0].members.iter().map(|m| m.file.path()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(members, sorted);
}
