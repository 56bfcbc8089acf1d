#[cfg(test)]
use std::collections::VecDeque;

use std::fmt::{self, Display};

use bytes::Bytes;
use reqwest::Response;

#[derive(Debug, PartialEq, Eq)]
pub struct Error(pub String);

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An adapter for streaming byte chunks.
pub enum Chunks {
    Response(Response),
    #[cfg(test)]
    VecDeque(VecDeque<Result<Bytes, Error>>),
}

impl Chunks {
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    #[cfg(test)]
    pub fn from_vec_deque(vec: VecDeque<Bytes>) -> Self {
        Chunks::VecDeque(vec.into_iter().map(Ok).collect())
    }

    #[cfg(test)]
    pub fn from_static(chunks: &[&'static [u8]]) -> Self {
        Chunks::VecDeque(
            chunks
                .iter()
                .copied()
                .map(|chunk| Ok(Bytes::from_static(chunk)))
                .collect(),
        )
    }

    /// Yields `chunks`, then fails with `message`.
    #[cfg(test)]
    pub fn from_static_then_error(
        chunks: &[&'static [u8]],
        message: &str,
    ) -> Self {
        let mut chunks = Self::from_static(chunks);
        if let Chunks::VecDeque(vec) = &mut chunks {
            vec.push_back(Err(Error(message.to_owned())));
        }
        chunks
    }

    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => {
                response.chunk().await.map_err(|err| Error(format!("{err}")))
            }
            #[cfg(test)]
            Chunks::VecDeque(vec) => vec.pop_front().transpose(),
        }
    }
}
