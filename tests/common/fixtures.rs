//! Test fixtures for integration tests.

#![allow(dead_code)]

use mongodb::bson::{Document, doc};

/// Generate `count` documents with sequential integer `_id`s.
pub fn numbered_documents(count: i32) -> Vec<Document> {
    (0..count)
        .map(|i| {
            doc! {
                "_id": i,
                "name": format!("Document {}", i),
                "category": if i % 2 == 0 { "even" } else { "odd" },
            }
        })
        .collect()
}

/// Users with repeated emails: two "a", three "b", one "c" and two without an email.
pub fn users_with_duplicate_emails() -> Vec<Document> {
    vec![
        doc! { "_id": 1, "email": "a@example.com" },
        doc! { "_id": 2, "email": "b@example.com" },
        doc! { "_id": 3, "email": "a@example.com" },
        doc! { "_id": 4, "email": "b@example.com" },
        doc! { "_id": 5, "email": "c@example.com" },
        doc! { "_id": 6, "email": "b@example.com" },
        doc! { "_id": 7, "name": "no email" },
        doc! { "_id": 8, "name": "no email either" },
    ]
}

/// A payload large enough to span several GridFS chunks.
pub fn blob_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
