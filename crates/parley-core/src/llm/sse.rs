/// Accumulates raw bytes from a server-sent-events body and yields complete
/// `data:` payloads. Chunks may split a line, or a UTF-8 character, anywhere;
/// only complete lines are decoded.
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and drain every complete `data:` payload it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw[..line_end]);
            let line = line.trim();

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_across_chunks() {
        let mut sse = SseBuffer::new();
        assert!(sse.push(b"data: {\"a\"").is_empty());
        let out = sse.push(b":1}\n\ndata: [DONE]\n");
        assert_eq!(out, vec!["{\"a\":1}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn test_ignores_event_and_comment_lines() {
        let mut sse = SseBuffer::new();
        let out = sse.push(b"event: message_start\n: ping\ndata: {}\r\n");
        assert_eq!(out, vec!["{}".to_string()]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let bytes = "data: café\n".as_bytes();
        // 'é' is two bytes; cut between them.
        let cut = bytes.len() - 2;
        let mut sse = SseBuffer::new();
        assert!(sse.push(&bytes[..cut]).is_empty());
        assert_eq!(sse.push(&bytes[cut..]), vec!["café".to_string()]);
    }
}
