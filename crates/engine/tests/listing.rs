mod common;

use std::collections::HashSet;

use common::Hive;
use hive_core::{ContentId, Direction, SortKey, TagId};
use hive_engine::{EngineError, ListRequest, Target};
use hive_storage::MemoryStorageConfig;

#[tokio::test]
async fn comments_page_in_creation_order() {
    let hive = Hive::new().await;
    let post = hive
        .engine
        .create_post(&hive.owner, hive.id, "post".to_owned(), vec![])
        .await
        .expect("post");
    let mut comments = Vec::new();
    for n in 1..=13 {
        let comment = hive
            .engine
            .create_comment(&hive.owner, hive.id, post.content_id, format!("comment {n}"))
            .await
            .expect("comment");
        comments.push(comment.content_id);
    }

    let first = hive
        .engine
        .list_content(&hive.owner, hive.id, ListRequest::comments(post.content_id).limit(5))
        .await
        .expect("first page");
    let ids: Vec<ContentId> = first.items.iter().map(|item| item.content_id).collect();
    assert_eq!(ids, comments[..5].to_vec());
    assert!(first.next_cursor.is_some());

    let rest = hive
        .engine
        .list_content(
            &hive.owner,
            hive.id,
            ListRequest::comments(post.content_id)
                .limit(0)
                .cursor(first.next_cursor),
        )
        .await
        .expect("second page");
    let ids: Vec<ContentId> = rest.items.iter().map(|item| item.content_id).collect();
    assert_eq!(ids, comments[5..].to_vec());
    assert!(rest.next_cursor.is_none());

    let post = hive
        .engine
        .get_content(&hive.owner, Target::new(hive.id, post.key()))
        .await
        .expect("post");
    assert_eq!(post.comment_count, 13);
}

/// Pages through a listing and returns every page's ids.
async fn drain(hive: &Hive, request: ListRequest) -> Vec<Vec<ContentId>> {
    let mut pages = Vec::new();
    let mut cursor = None;
    loop {
        let page = hive
            .engine
            .list_content(&hive.owner, hive.id, request.clone().cursor(cursor))
            .await
            .expect("page");
        pages.push(page.items.iter().map(|item| item.content_id).collect());
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return pages,
        }
        assert!(pages.len() < 100, "listing does not terminate");
    }
}

#[tokio::test]
async fn pages_partition_the_listing() {
    let hive = Hive::with(
        MemoryStorageConfig {
            max_page_items: 3,
            ..MemoryStorageConfig::default()
        },
        hive_engine::EngineConfig::default(),
    )
    .await;
    let tag = TagId::new();
    let mut tagged = Vec::new();
    let mut all = Vec::new();
    for n in 0..23 {
        let tags = if n % 2 == 0 { vec![tag] } else { vec![] };
        let post = hive
            .engine
            .create_post(&hive.owner, hive.id, format!("post {n}"), tags)
            .await
            .expect("post");
        if n % 2 == 0 {
            tagged.push(post.content_id);
        }
        all.push(post.content_id);
    }
    all.reverse();
    tagged.reverse();

    for limit in 1..=7 {
        for (request, expected) in [
            (ListRequest::posts(hive.id).limit(limit), &all),
            (ListRequest::posts(hive.id).limit(limit).tags([tag]), &tagged),
            (
                ListRequest::posts(hive.id)
                    .limit(limit)
                    .sort(SortKey::LastActivity),
                &all,
            ),
        ] {
            let pages = drain(&hive, request).await;
            let limit = usize::try_from(limit).expect("limit");
            let (last, full) = pages.split_last().expect("at least one page");
            assert!(full.iter().all(|page| page.len() == limit), "limit {limit}");
            assert!(last.len() <= limit);

            let flat: Vec<ContentId> = pages.concat();
            let unique: HashSet<ContentId> = flat.iter().copied().collect();
            assert_eq!(unique.len(), flat.len(), "duplicates at limit {limit}");
            assert_eq!(&flat, expected, "limit {limit}");
        }
    }
}

#[tokio::test]
async fn ascending_and_descending_are_mirror_images() {
    let hive = Hive::new().await;
    for n in 0..9 {
        hive.engine
            .create_post(&hive.owner, hive.id, format!("post {n}"), vec![])
            .await
            .expect("post");
    }
    let newest_first = drain(&hive, ListRequest::posts(hive.id).limit(4)).await.concat();
    let mut oldest_first = drain(
        &hive,
        ListRequest::posts(hive.id)
            .limit(4)
            .direction(Direction::Ascending),
    )
    .await
    .concat();
    oldest_first.reverse();
    assert_eq!(newest_first, oldest_first);
}

#[tokio::test]
async fn listing_requires_membership_and_a_real_post() {
    let hive = Hive::new().await;
    let stranger = hive_auth::Caller::user("stranger");
    assert!(matches!(
        hive.engine
            .list_content(&stranger, hive.id, ListRequest::posts(hive.id))
            .await,
        Err(EngineError::Unauthorized(_))
    ));
    assert_eq!(
        hive.engine
            .list_content(&hive.owner, hive.id, ListRequest::comments(ContentId::new()))
            .await,
        Err(EngineError::NotFound)
    );

    let too_many_tags = ListRequest::posts(hive.id).tags((0..26).map(|_| TagId::new()));
    assert!(matches!(
        hive.engine
            .list_content(&hive.owner, hive.id, too_many_tags)
            .await,
        Err(EngineError::BadRequest(_))
    ));
}
