use std::{collections::BTreeMap, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::TryStreamExt;
use sitemapd::{
    application::{
        aggregator::CatalogAggregator,
        coordinator::{RebuildCoordinator, RebuildOutcome},
        pointer::CurrentArtifactCache,
        publisher::ArtifactPublisher,
        repos::{BlobStore, LeaseStore},
        serve::SitemapReader,
    },
    domain::{
        artifact::artifact_file_name,
        content::ContentItem,
        site::{NestedSection, SectionPlan, SiteContext, SiteProfile, SiteRegistry, SlugPage},
    },
    infra::{
        blob::FsBlobStore,
        memory::{MemoryContentRepo, MemoryLeaseStore, MemoryPointerStore},
    },
};
use tempfile::TempDir;
use time::macros::datetime;
use url::Url;

fn item(id: &str, content_type: &str, slug: &str) -> ContentItem {
    ContentItem {
        id: id.to_string(),
        content_type: content_type.to_string(),
        slugs: BTreeMap::from([("nl".to_string(), slug.to_string())]),
        published: true,
        deleted: false,
        created_at: None,
        last_modified_at: Some(datetime!(2023-01-01 00:00 UTC)),
        relations: BTreeMap::new(),
    }
}

fn catalog() -> Vec<ContentItem> {
    let mut vision = item("v1", "vision", "haven");
    vision
        .relations
        .insert("participations".to_string(), vec!["p1".to_string()]);
    vec![
        item("home", "page", "home"),
        vision,
        item("p1", "participation", "enquete"),
    ]
}

fn profile() -> SiteProfile {
    SiteProfile {
        context: SiteContext::parse("am").expect("valid context"),
        base_url: "https://am.example.org".to_string(),
        locales: vec!["nl".to_string()],
        membership: None,
        schedule: "0 0 3 * * *".to_string(),
        sections: SectionPlan {
            main_pages: vec![SlugPage {
                slug: "home".to_string(),
                paths: vec![String::new(), "home".to_string()],
            }],
            landing_pages: Vec::new(),
            collections: Vec::new(),
            nested: vec![NestedSection {
                name: "vision-participations".to_string(),
                parent_content_types: vec!["vision".to_string()],
                relation: "participations".to_string(),
                parent_prefix: "projecten".to_string(),
                child_segment: "doe-mee".to_string(),
                suffix: None,
            }],
        },
    }
}

struct Pipeline {
    _dir: TempDir,
    blobs: Arc<FsBlobStore>,
    pointer: CurrentArtifactCache,
    leases: Arc<MemoryLeaseStore>,
    content: Arc<MemoryContentRepo>,
}

impl Pipeline {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let blobs = Arc::new(FsBlobStore::new(dir.path().join("artifacts")).expect("blob store"));
        let pointer = CurrentArtifactCache::new(
            Arc::new(MemoryPointerStore::new()),
            Duration::from_secs(60),
        );
        Self {
            _dir: dir,
            blobs,
            pointer,
            leases: Arc::new(MemoryLeaseStore::new()),
            content: Arc::new(MemoryContentRepo::new(catalog())),
        }
    }

    fn coordinator(&self, owner: &str) -> RebuildCoordinator {
        RebuildCoordinator::new(
            self.leases.clone(),
            CatalogAggregator::new(self.content.clone()),
            ArtifactPublisher::new(self.blobs.clone(), self.pointer.clone()),
            owner,
            Duration::from_secs(60),
        )
    }

    async fn served_document(&self, site: &SiteContext) -> String {
        let opened = SitemapReader::new(self.pointer.clone(), self.blobs.clone())
            .open(site)
            .await
            .expect("sitemap available");
        let chunks: Vec<Bytes> = opened.body.try_collect().await.expect("read body");
        String::from_utf8(chunks.concat()).expect("utf-8 document")
    }
}

#[tokio::test]
async fn rebuild_writes_a_document_to_disk_and_serves_it() {
    let pipeline = Pipeline::new();
    let site = profile();

    let outcome = pipeline
        .coordinator("node-a")
        .rebuild(&site)
        .await
        .expect("rebuild");
    let RebuildOutcome::Published(summary) = outcome else {
        panic!("expected a published artifact");
    };
    assert_eq!(summary.entries, 3);
    assert!(summary.failed_branches.is_empty());

    let document = pipeline.served_document(&site.context).await;
    assert!(document.contains(
        "  <url>\n    <loc>https://am.example.org/nl</loc>\n    <lastmod>2023-01-01T00:00:00.000Z</lastmod>\n    <changefreq>daily</changefreq>\n  </url>\n"
    ));
    assert!(document.contains("<loc>https://am.example.org/nl/home</loc>"));
    assert!(document.contains("<loc>https://am.example.org/nl/projecten/haven/doe-mee/enquete</loc>"));

    let on_disk = pipeline
        .blobs
        .root()
        .join(artifact_file_name(&site.context))
        .join(format!("{}.xml", summary.publish.artifact_id));
    assert_eq!(
        std::fs::read_to_string(on_disk).expect("artifact file"),
        document
    );
}

#[tokio::test]
async fn successive_rebuilds_keep_only_the_current_artifact() {
    let pipeline = Pipeline::new();
    let site = profile();
    let coordinator = pipeline.coordinator("node-a");

    coordinator.rebuild(&site).await.expect("first rebuild");
    coordinator.rebuild(&site).await.expect("second rebuild");
    let RebuildOutcome::Published(last) = coordinator.rebuild(&site).await.expect("third rebuild")
    else {
        panic!("expected a published artifact");
    };

    let metas = pipeline
        .blobs
        .list_metadata(&artifact_file_name(&site.context))
        .await
        .expect("list");
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0].id, last.publish.artifact_id);
    assert_eq!(
        pipeline.pointer.get(&site.context).await.expect("pointer"),
        last.publish.artifact_id
    );
    assert_eq!(last.publish.removed.len(), 1);
}

#[tokio::test]
async fn concurrent_instances_never_leave_two_artifacts() {
    let pipeline = Pipeline::new();
    let site = profile();
    let a = pipeline.coordinator("node-a");
    let b = pipeline.coordinator("node-b");

    let (first, second) = tokio::join!(a.rebuild(&site), b.rebuild(&site));
    let outcomes = [first.expect("node-a"), second.expect("node-b")];

    assert!(
        outcomes
            .iter()
            .any(|outcome| matches!(outcome, RebuildOutcome::Published(_)))
    );
    let metas = pipeline
        .blobs
        .list_metadata(&artifact_file_name(&site.context))
        .await
        .expect("list");
    assert_eq!(metas.len(), 1);
    assert_eq!(
        pipeline.pointer.get(&site.context).await.expect("pointer"),
        metas[0].id
    );
    assert!(
        pipeline
            .leases
            .holder(&RebuildCoordinator::lease_key(&site.context))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn held_lease_skips_without_touching_storage() {
    let pipeline = Pipeline::new();
    let site = profile();
    let key = RebuildCoordinator::lease_key(&site.context);
    pipeline
        .leases
        .acquire(&key, "node-b", Duration::from_secs(60))
        .await
        .expect("foreign lease");

    let outcome = pipeline
        .coordinator("node-a")
        .rebuild(&site)
        .await
        .expect("skip is not an error");

    assert_eq!(outcome, RebuildOutcome::Skipped);
    assert!(
        pipeline
            .blobs
            .list_metadata(&artifact_file_name(&site.context))
            .await
            .expect("list")
            .is_empty()
    );
    assert!(pipeline.pointer.get(&site.context).await.is_err());
    assert_eq!(pipeline.leases.holder(&key).await.as_deref(), Some("node-b"));
}

#[tokio::test]
async fn rebuild_all_covers_every_registered_site() {
    let pipeline = Pipeline::new();
    let mut dgv = profile();
    dgv.context = SiteContext::parse("dgv").expect("valid context");
    dgv.base_url = "https://dgv.example.org".to_string();
    let registry = SiteRegistry::new([profile(), dgv]);

    let outcomes = pipeline.coordinator("node-a").rebuild_all(&registry).await;

    assert_eq!(outcomes.len(), 2);
    for (site, outcome) in outcomes {
        assert!(matches!(outcome, Ok(RebuildOutcome::Published(_))), "{site}");
        let document = pipeline.served_document(&site).await;
        assert!(document.contains(&format!("https://{site}.example.org/nl")));
    }
}

#[tokio::test]
async fn overlapping_rebuild_from_the_same_instance_is_skipped() {
    let pipeline = Pipeline::new();
    let site = profile();
    let key = RebuildCoordinator::lease_key(&site.context);
    pipeline
        .leases
        .acquire(&key, "pid-1", Duration::from_secs(60))
        .await
        .expect("in-flight lease");

    let outcome = pipeline
        .coordinator("pid-1")
        .rebuild(&site)
        .await
        .expect("skip is not an error");

    assert_eq!(outcome, RebuildOutcome::Skipped);
    assert!(
        pipeline
            .blobs
            .list_metadata(&artifact_file_name(&site.context))
            .await
            .expect("list")
            .is_empty()
    );
    assert_eq!(pipeline.leases.holder(&key).await.as_deref(), Some("pid-1"));
}

#[tokio::test]
async fn overlapping_rebuilds_sharing_one_coordinator_publish_once() {
    let pipeline = Pipeline::new();
    let site = profile();
    let coordinator = pipeline.coordinator("pid-1");

    let (first, second) = tokio::join!(coordinator.rebuild(&site), coordinator.rebuild(&site));
    let published = [first.expect("first"), second.expect("second")]
        .iter()
        .filter(|outcome| matches!(outcome, RebuildOutcome::Published(_)))
        .count();

    assert!(published >= 1);
    let metas = pipeline
        .blobs
        .list_metadata(&artifact_file_name(&site.context))
        .await
        .expect("list");
    assert_eq!(metas.len(), 1);
    assert_eq!(
        pipeline.pointer.get(&site.context).await.expect("pointer"),
        metas[0].id
    );
}

#[tokio::test]
async fn default_site_layout_only_lists_urls_under_the_base_url() {
    let mut pipeline = Pipeline::new();
    let mut vision = item("v1", "58d8d7ffcc4e35a38f275ef1", "wat nu?");
    vision
        .relations
        .insert("participations".to_string(), vec!["p1".to_string()]);
    pipeline.content = Arc::new(MemoryContentRepo::new(vec![
        item("home", "page", "home"),
        item("overview", "page", "visions-overview"),
        item("contact", "page", "contact"),
        vision,
        item("v2", "58eb5396152216149a7fc15e", "markt#plein"),
        item("pr1", "58d8ec8298490acd83bf3348", "brug"),
        item("p1", "58da6a1707bc1351f2dfbb45", "enquete"),
        item("a1", "591d46ad1ff864234b8e4501", "team"),
    ]));
    let mut site = profile();
    site.sections = SectionPlan::default();

    let RebuildOutcome::Published(summary) = pipeline
        .coordinator("node-a")
        .rebuild(&site)
        .await
        .expect("rebuild")
    else {
        panic!("expected a published artifact");
    };
    assert!(summary.failed_branches.is_empty());

    let document = pipeline.served_document(&site.context).await;
    let locs: Vec<&str> = document
        .split("<loc>")
        .skip(1)
        .filter_map(|rest| rest.split("</loc>").next())
        .collect();
    assert_eq!(locs.len(), summary.entries);
    assert!(locs.len() > 20);

    for loc in &locs {
        let parsed = Url::parse(loc).expect("absolute location");
        assert!(loc.starts_with("https://am.example.org/"), "{loc}");
        assert_eq!(parsed.host_str(), Some("am.example.org"), "{loc}");
        assert_eq!(parsed.query(), None, "{loc}");
        assert_eq!(parsed.fragment(), None, "{loc}");
        assert!(parsed.path().starts_with("/nl"), "{loc}");
    }
    assert!(locs.contains(&"https://am.example.org/nl/projecten/wat%20nu%3F/over"));
    assert!(locs.contains(&"https://am.example.org/nl/projecten/wat%20nu%3F/doe-mee/enquete"));
}
