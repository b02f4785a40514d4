mod common;

use common::{file_names, image_server, test_loader, ScriptedPlugin};
use std::fs::File;
use std::sync::Arc;

#[tokio::test]
async fn claymore_range_with_archives() {
    let (server, _mock) = image_server("image/jpg").await;
    let plugin = Arc::new(ScriptedPlugin::new().with_series("Claymore", 1..=30, 3, &server.url(), "jpg"));
    let root = tempfile::tempdir().unwrap();
    let mut loader = test_loader(plugin, root.path(), 2);
    loader.prepare().await.unwrap();

    let mut series = loader.resolve_series("Claymore").await.unwrap();
    let numbers: Vec<u32> = (14..=20).collect();
    let summary = loader.handle(&mut series, &numbers, true).await;

    assert!(summary.is_clean(), "{}", summary);
    assert_eq!(summary.chapters_done, numbers);
    assert_eq!(summary.images_stored, 21);
    assert_eq!(summary.archives.len(), 7);

    let series_dir = root.path().join("downloads/Claymore");
    for number in 14..=20 {
        let chapter_name = format!("Claymore {:03}", number);
        assert_eq!(
            file_names(&series_dir.join(&chapter_name)),
            vec!["001.jpg", "002.jpg", "003.jpg"]
        );

        let cbz = series_dir.join(format!("{}.cbz", chapter_name));
        let mut archive = zip::ZipArchive::new(File::open(&cbz).unwrap()).unwrap();
        let mut entries: Vec<String> = archive.file_names().map(str::to_string).collect();
        entries.sort();
        assert_eq!(
            entries,
            vec![
                format!("{}/001.jpg", chapter_name),
                format!("{}/002.jpg", chapter_name),
                format!("{}/003.jpg", chapter_name),
                format!("{}/ComicInfo.xml", chapter_name),
            ]
        );

        let page = archive.by_name(&format!("{}/001.jpg", chapter_name)).unwrap();
        assert_eq!(page.size(), "not really an image".len() as u64);
    }

    assert!(!series_dir.join("Claymore 013").exists());
    assert!(!series_dir.join("Claymore 021").exists());
}
