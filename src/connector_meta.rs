//! Social-media connector stub.
//!
//! Stands in for the Meta Graph API: returns a fixed set of venue pages and
//! their recent posts without any network access. Posts with an image get an
//! `image_path` of the form `img/<post_id>.jpg`; the image itself is never
//! downloaded.

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Venue {
    pub id: &'static str,
    pub name: &'static str,
    pub city: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: String,
    pub caption: String,
    pub date: String,
    pub image_url: Option<String>,
    pub image_path: Option<String>,
}

impl Post {
    /// The post as a dataset `input` object.
    pub fn to_input(&self) -> Value {
        let mut input = json!({
            "id": self.id,
            "caption": self.caption,
            "date": self.date,
        });
        if let Some(path) = &self.image_path {
            input["image_path"] = json!(path);
        }
        input
    }
}

const VENUES: &[Venue] = &[
    Venue {
        id: "123456789",
        name: "Riquela Club",
        city: "Santiago de Compostela",
    },
    Venue {
        id: "987654321",
        name: "Clandestino",
        city: "A Coruña",
    },
    Venue {
        id: "456789123",
        name: "Sala Malatesta",
        city: "Vigo",
    },
];

/// `(venue_id, post_id, caption, date, image_url)`
const SAMPLE_POSTS: &[(&str, &str, &str, &str, &str)] = &[
    (
        "123456789",
        "post_123",
        "Concertos de abril 🫶\n\n12.04.24 👉 @javierturnes\n19.04.24 👉 @tulsamireniza\n20.04.24 👉 @freedoniasoul\n26.04.24 👉 @madmartintrio\n28.04.24 👉 @nubiyantwist\n\nPara máis info consulta a nosa web 🙇🏻‍♂️ link in bio\n\n📸 @aigiboga\n\n#riquela #riquelaclub #santiagodecompostela",
        "2024-04-01",
        "https://example.com/image1.jpg",
    ),
    (
        "987654321",
        "post_456",
        "Este viernes 10.05.25 tenemos a @insaniam con @nodropforus y @frequency en concierto. Entradas a la venta en nuestra web. #clandestino #acoruña",
        "2024-05-05",
        "https://example.com/image2.jpg",
    ),
];

pub fn venues() -> &'static [Venue] {
    VENUES
}

/// Most recent posts of one venue, newest first, at most `limit`.
pub fn posts_from_venue(venue_id: &str, limit: usize) -> Vec<Post> {
    tracing::debug!(venue_id, "fetching venue posts");
    SAMPLE_POSTS
        .iter()
        .filter(|(venue, ..)| *venue == venue_id)
        .take(limit)
        .map(|(_, id, caption, date, image_url)| Post {
            id: id.to_string(),
            caption: caption.to_string(),
            date: date.to_string(),
            image_url: Some(image_url.to_string()).filter(|u| !u.is_empty()),
            image_path: None,
        })
        .collect()
}

/// Posts from every known venue, with local image paths assigned.
pub fn get_posts_with_images() -> Vec<Post> {
    let mut posts = Vec::new();
    for venue in venues() {
        for mut post in posts_from_venue(venue.id, 10) {
            if post.image_url.is_some() {
                post.image_path = Some(format!("img/{}.jpg", post.id));
            }
            posts.push(post);
        }
    }
    tracing::info!(posts = posts.len(), "posts collected");
    posts
}

/// `peval posts`
pub fn list_posts() -> Result<()> {
    let posts = get_posts_with_images();

    println!("{:<12} {:<12} {:<20} CAPTION", "ID", "DATE", "IMAGE");
    for post in &posts {
        let preview: String = post
            .caption
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(60)
            .collect();
        println!(
            "{:<12} {:<12} {:<20} {}",
            post.id,
            post.date,
            post.image_path.as_deref().unwrap_or("-"),
            preview
        );
    }
    println!("{} post(s)", posts.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posts_with_images() {
        let posts = get_posts_with_images();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "post_123");
        assert_eq!(posts[0].image_path.as_deref(), Some("img/post_123.jpg"));
        assert_eq!(posts[1].date, "2024-05-05");
    }

    #[test]
    fn test_venue_without_posts() {
        assert!(posts_from_venue("456789123", 10).is_empty());
        assert_eq!(posts_from_venue("123456789", 0).len(), 0);
    }

    #[test]
    fn test_to_input_is_a_post_object() {
        let post = &get_posts_with_images()[1];
        let input = post.to_input();
        assert_eq!(input["id"], "post_456");
        assert_eq!(input["image_path"], "img/post_456.jpg");
        assert!(input["caption"].as_str().unwrap().contains("@insaniam"));
    }
}
